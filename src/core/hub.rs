//! Model location resolution and hub downloads

use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::core::config::TranslatorConfig;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::ModelSource;
use crate::core::onnx::ModelFiles;

/// Files a model directory cannot work without
pub const REQUIRED_FILES: &[&str] = &[
    "config.json",
    "tokenizer.json",
    "onnx/encoder_model.onnx",
    "onnx/decoder_model.onnx",
];

/// Half precision graphs, used on the accelerator when present
pub const OPTIONAL_FILES: &[&str] = &[
    "onnx/encoder_model_fp16.onnx",
    "onnx/decoder_model_fp16.onnx",
];

/// Resolve the configured model source into a directory on disk.
///
/// Remote models are cached under `models_dir`; in offline mode only the
/// cache is consulted.
pub async fn resolve_model_dir(config: &TranslatorConfig) -> Result<PathBuf> {
    match &config.model_source {
        ModelSource::Local(path) => {
            if !path.is_dir() {
                return Err(TranslationError::ModelNotFound {
                    location: path.display().to_string(),
                });
            }
            Ok(path.clone())
        }
        ModelSource::Remote(model_id) => {
            let cache_dir = config.cache_dir_for(model_id);

            if ModelFiles::locate(&cache_dir).is_ok() {
                debug!("Using cached model at {}", cache_dir.display());
                return Ok(cache_dir);
            }

            if config.offline {
                warn!(
                    "Offline mode: {} is not cached in {}",
                    model_id,
                    config.models_dir.display()
                );
                return Err(TranslationError::ModelNotFound {
                    location: format!("{} (offline, looked in {})", model_id, cache_dir.display()),
                });
            }

            let hub = HubClient::new(config)?;
            hub.download_model(model_id, &cache_dir, false).await
        }
    }
}

/// Minimal client for fetching model files from the hub
#[derive(Debug, Clone)]
pub struct HubClient {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    stall_timeout: Duration,
}

impl HubClient {
    /// Create a new hub client.
    ///
    /// `timeout_ms` bounds each wait for response headers or the next body
    /// chunk, not the whole transfer.
    pub fn new(config: &TranslatorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.hub_endpoint.trim_end_matches('/').to_string(),
            token: config.hub_token.clone(),
            stall_timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    /// Download URL of a file in a repository
    pub fn file_url(&self, model_id: &str, file: &str) -> String {
        format!("{}/{}/resolve/main/{}", self.endpoint, model_id, file)
    }

    /// Download every model file missing from `target_dir`
    pub async fn download_model(
        &self,
        model_id: &str,
        target_dir: &Path,
        show_progress: bool,
    ) -> Result<PathBuf> {
        info!("Downloading {} into {}", model_id, target_dir.display());

        tokio::fs::create_dir_all(target_dir).await?;

        for file in REQUIRED_FILES {
            let dest = target_dir.join(file);
            if dest.exists() {
                debug!("Already present: {}", dest.display());
                continue;
            }
            self.download_file(model_id, file, &dest, show_progress).await?;
        }

        for file in OPTIONAL_FILES {
            let dest = target_dir.join(file);
            if dest.exists() {
                continue;
            }
            match self.download_file(model_id, file, &dest, show_progress).await {
                Ok(_) => {}
                Err(TranslationError::ModelNotFound { .. }) => {
                    debug!("Optional file {} not published for {}", file, model_id);
                }
                Err(e) => return Err(e),
            }
        }

        info!("Downloaded to: {}", target_dir.display());
        Ok(target_dir.to_path_buf())
    }

    /// Stream one file to disk, returning its size in bytes
    async fn download_file(
        &self,
        model_id: &str,
        file: &str,
        dest: &Path,
        show_progress: bool,
    ) -> Result<u64> {
        let url = self.file_url(model_id, file);
        debug!("GET {}", url);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let stalled = |url: &str| TranslationError::Download {
            url: url.to_string(),
            message: format!("no data received for {:?}", self.stall_timeout),
        };

        let mut response = tokio::time::timeout(self.stall_timeout, request.send())
            .await
            .map_err(|_| stalled(&url))?
            .map_err(|e| TranslationError::Download {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TranslationError::ModelNotFound { location: url });
        }
        if !status.is_success() {
            return Err(TranslationError::Download {
                url,
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pb = if show_progress {
            let pb = ProgressBar::new(response.content_length().unwrap_or(0));
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            pb.set_message(file.to_string());
            pb
        } else {
            ProgressBar::hidden()
        };

        // Write to a side file so an interrupted download never looks complete
        let partial = PathBuf::from(format!("{}.part", dest.display()));
        let mut out = tokio::fs::File::create(&partial).await?;
        let mut written: u64 = 0;

        loop {
            let chunk = tokio::time::timeout(self.stall_timeout, response.chunk())
                .await
                .map_err(|_| stalled(&url))?
                .map_err(|e| TranslationError::Download {
                    url: url.clone(),
                    message: e.to_string(),
                })?;
            let Some(chunk) = chunk else { break };
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
            pb.inc(chunk.len() as u64);
        }

        out.flush().await?;
        drop(out);
        tokio::fs::rename(&partial, dest).await?;

        pb.finish_with_message(format!("{} done", file));
        info!("Fetched {} ({} bytes)", file, written);

        Ok(written)
    }
}

//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::core::models::{ModelSource, DEFAULT_NEW_TOKENS, MAX_NEW_TOKENS, MIN_NEW_TOKENS};

/// Hub repository used when no model location is configured
pub const DEFAULT_MODEL_ID: &str = "Xenova/m2m100_418M";

/// Default hub endpoint
pub const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";

/// Configuration for translator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    pub model_source: ModelSource,
    pub offline: bool,
    pub models_dir: PathBuf,
    pub hub_endpoint: String,
    #[serde(default, skip_serializing)]
    pub hub_token: Option<String>,
    pub max_new_tokens: usize,
    pub max_input_tokens: usize,
    #[serde(default = "default_num_beams")]
    pub num_beams: usize,
    pub intra_threads: usize,
    pub use_gpu: bool,
    pub timeout_ms: u64,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            model_source: ModelSource::Remote(DEFAULT_MODEL_ID.to_string()),
            offline: false,
            models_dir: PathBuf::from("models"),
            hub_endpoint: DEFAULT_HUB_ENDPOINT.to_string(),
            hub_token: None,
            max_new_tokens: DEFAULT_NEW_TOKENS,
            max_input_tokens: 512,
            num_beams: default_num_beams(),
            intra_threads: 4,
            use_gpu: true,
            timeout_ms: 600_000,
        }
    }
}

fn default_num_beams() -> usize {
    4
}

/// Interpret `1`/`true`/`yes`/`on` as set
fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

impl TranslatorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        // An explicit directory wins over a hub identifier
        let model_source = match std::env::var("MODEL_DIR") {
            Ok(dir) if !dir.trim().is_empty() => ModelSource::Local(PathBuf::from(dir)),
            _ => ModelSource::Remote(
                std::env::var("MODEL_ID").unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string()),
            ),
        };

        let offline = env_flag("TRANSLATOR_OFFLINE")
            || env_flag("HF_HUB_OFFLINE")
            || env_flag("TRANSFORMERS_OFFLINE");

        let models_dir = std::env::var("MODELS_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.models_dir);

        let hub_endpoint = std::env::var("HF_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_HUB_ENDPOINT.to_string());

        let hub_token = std::env::var("HF_TOKEN").ok().filter(|t| !t.is_empty());

        let max_new_tokens = std::env::var("MAX_NEW_TOKENS")
            .unwrap_or_else(|_| DEFAULT_NEW_TOKENS.to_string())
            .parse::<usize>()?;

        let max_input_tokens = std::env::var("MAX_INPUT_TOKENS")
            .unwrap_or_else(|_| "512".to_string())
            .parse::<usize>()?;

        let num_beams = std::env::var("NUM_BEAMS")
            .unwrap_or_else(|_| default_num_beams().to_string())
            .parse::<usize>()?;

        let intra_threads = std::env::var("INTRA_THREADS")
            .unwrap_or_else(|_| "4".to_string())
            .parse::<usize>()?;

        let use_gpu = match std::env::var("USE_GPU") {
            Ok(_) => env_flag("USE_GPU"),
            Err(_) => defaults.use_gpu,
        };

        let timeout_ms = std::env::var("REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| "600000".to_string())
            .parse::<u64>()?;

        let config = Self {
            model_source,
            offline,
            models_dir,
            hub_endpoint,
            hub_token,
            max_new_tokens,
            max_input_tokens,
            num_beams,
            intra_threads,
            use_gpu,
            timeout_ms,
        };

        info!("Model source: {} (offline: {})", config.model_source, config.offline);

        Ok(config)
    }

    /// Load from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.model_source.location().trim().is_empty() {
            return Err(anyhow::anyhow!("Model location is required"));
        }

        if !(MIN_NEW_TOKENS..=MAX_NEW_TOKENS).contains(&self.max_new_tokens) {
            return Err(anyhow::anyhow!(
                "max_new_tokens must be between {} and {}",
                MIN_NEW_TOKENS,
                MAX_NEW_TOKENS
            ));
        }

        if self.max_input_tokens < 8 {
            return Err(anyhow::anyhow!("max_input_tokens must be at least 8"));
        }

        if !(1..=16).contains(&self.num_beams) {
            return Err(anyhow::anyhow!("num_beams must be between 1 and 16"));
        }

        if self.intra_threads == 0 {
            return Err(anyhow::anyhow!("intra_threads must be greater than 0"));
        }

        if let ModelSource::Remote(_) = self.model_source {
            if self.hub_endpoint.is_empty() && !self.offline {
                return Err(anyhow::anyhow!("Hub endpoint is required for remote models"));
            }
        }

        if self.use_gpu && !cfg!(feature = "cuda") {
            warn!("GPU requested but built without the `cuda` feature, using CPU");
        }

        Ok(())
    }

    /// Directory a remote model is cached in
    pub fn cache_dir_for(&self, model_id: &str) -> PathBuf {
        model_id
            .split('/')
            .filter(|part| !part.is_empty() && *part != "..")
            .fold(self.models_dir.clone(), |dir, part| dir.join(part))
    }
}

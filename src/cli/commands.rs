//! CLI command definitions and handlers

use anyhow::Context;
use clap::Subcommand;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::core::config::{TranslatorConfig, DEFAULT_MODEL_ID};
use crate::core::errors::{Result, TranslationError};
use crate::core::hub::HubClient;
use crate::core::models::{CancelToken, ModelSource, ProgressState, TargetLanguage, SOURCE_LANG};
use crate::core::session::TranslationSession;
use crate::processors::export::{output_file_name, write_text, PageSelection};
use crate::processors::lines::line_count;
use crate::processors::pages::{collect_all_pages, translate_all_pages, translate_page};
use crate::processors::pdf::{PageSource, PdfDocument};

/// Commands for the Japanese translator
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Translate Japanese text line by line
    Translate {
        /// Input text file
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Text to translate (stdin is read when neither --file nor --text is given)
        #[arg(long)]
        text: Option<String>,

        /// Target language: vi or en
        #[arg(short, long = "to", default_value = "vi")]
        target_lang: String,

        /// Output file (default: {stem}_{lang}.txt next to --file, else stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Upper bound on generated tokens per line (32-512)
        #[arg(long)]
        max_new_tokens: Option<usize>,
    },

    /// Show the page count of a PDF
    PdfInfo {
        /// PDF file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Extract the Japanese text of one page or of all pages
    PdfExtract {
        /// PDF file
        #[arg(short, long)]
        file: PathBuf,

        /// Page number starting at 1 (all pages when omitted)
        #[arg(short, long)]
        page: Option<usize>,

        /// Output file (default: deterministic name next to the PDF)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Translate one page or all pages of a PDF
    PdfTranslate {
        /// PDF file
        #[arg(short, long)]
        file: PathBuf,

        /// Page number starting at 1 (all pages when omitted)
        #[arg(short, long)]
        page: Option<usize>,

        /// Target language: vi or en
        #[arg(short, long = "to", default_value = "vi")]
        target_lang: String,

        /// Output file (default: deterministic name next to the PDF)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Upper bound on generated tokens per line (32-512)
        #[arg(long)]
        max_new_tokens: Option<usize>,
    },

    /// Start the web interface
    Server {
        /// Bind address (default: 127.0.0.1)
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Listen port (default: 8000)
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
    },

    /// Download a model from the hub into the models directory
    Download {
        /// Hub repository (default: configured model id)
        #[arg(long)]
        repo: Option<String>,

        /// Target directory (default: {models_dir}/{repo})
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn progress_bar(total: u64, unit: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{eta}}) {{msg}}",
                unit
            ))?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

/// Cancel token tripped by Ctrl-C
fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancellation requested, stopping after the current line");
            token.cancel();
        }
    });
    cancel
}

fn progress_updater(pb: &ProgressBar) -> impl FnMut(&ProgressState) {
    let pb = pb.clone();
    move |state| {
        pb.set_length(state.total as u64);
        pb.set_position(state.completed as u64);
        if state.cancelled {
            pb.set_message("cancelling");
        }
    }
}

/// Run a blocking translation job on the blocking pool
async fn run_blocking<F>(job: F) -> Result<String>
where
    F: FnOnce() -> Result<String> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| TranslationError::InternalError(e.to_string()))?
}

/// Turn a finished run into its output; `None` when the user cancelled
fn finish_run(result: Result<String>, pb: &ProgressBar) -> anyhow::Result<Option<String>> {
    match result {
        Ok(text) => {
            pb.finish_with_message("Completed");
            Ok(Some(text))
        }
        Err(e) if e.is_cancelled() => {
            pb.abandon_with_message("Cancelled");
            println!("\n⏹  Translation cancelled, nothing was saved.");
            Ok(None)
        }
        Err(e) => {
            pb.abandon_with_message("Failed");
            Err(e.into())
        }
    }
}

fn apply_max_new_tokens(mut config: TranslatorConfig, max_new_tokens: Option<usize>) -> TranslatorConfig {
    if let Some(max_new_tokens) = max_new_tokens {
        config.max_new_tokens = max_new_tokens;
    }
    config
}

async fn load_session(config: TranslatorConfig) -> anyhow::Result<TranslationSession> {
    println!("⏳ Loading model {} ...", config.model_source);
    let session = TranslationSession::load(config)
        .await
        .context("Translation is unavailable")?;
    println!("✅ Model ready: {}", session.model_name());
    Ok(session)
}

async fn open_pdf(file: &Path) -> anyhow::Result<PdfDocument> {
    let path = file.to_path_buf();
    let doc = tokio::task::spawn_blocking(move || PdfDocument::open(&path)).await??;
    Ok(doc)
}

fn sibling_path(file: &Path, name: String) -> PathBuf {
    file.with_file_name(name)
}

/// Handle text translation command
pub async fn handle_translate(
    config: TranslatorConfig,
    file: Option<PathBuf>,
    text: Option<String>,
    target_lang: String,
    output: Option<PathBuf>,
    max_new_tokens: Option<usize>,
) -> anyhow::Result<()> {
    let start_time = Instant::now();
    let target_lang: TargetLanguage = target_lang.parse()?;

    let source_text = match (&file, text) {
        (Some(path), _) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, Some(text)) => text,
        (None, None) => {
            let mut buffer = String::new();
            tokio::io::stdin().read_to_string(&mut buffer).await?;
            buffer
        }
    };

    if source_text.trim().is_empty() {
        anyhow::bail!("Nothing to translate: the input is empty");
    }

    info!("Starting text translation");
    info!("Target language: {}", target_lang);
    info!("Lines: {}", line_count(&source_text));

    let session = load_session(apply_max_new_tokens(config, max_new_tokens)).await?;

    let pb = progress_bar(line_count(&source_text) as u64, "lines")?;
    let cancel = cancel_on_ctrl_c();

    let result = run_blocking({
        let session = session.clone();
        let on_progress = progress_updater(&pb);
        move || session.translate_document(&source_text, target_lang, on_progress, &cancel)
    })
    .await;

    let Some(translated) = finish_run(result, &pb)? else {
        return Ok(());
    };

    let destination = output.or_else(|| {
        file.as_ref().map(|path| {
            let stem = path.file_stem().map(|s| s.to_string_lossy().to_string());
            sibling_path(path, output_file_name(stem.as_deref(), None, target_lang.code()))
        })
    });

    match destination {
        Some(path) => {
            write_text(&path, &translated).await?;
            println!("\n✅ Translation completed!");
            println!("   Saved: {}", path.display());
            println!("   Time: {:?}", start_time.elapsed());
        }
        None => println!("{}", translated),
    }

    Ok(())
}

/// Handle PDF info command
pub async fn handle_pdf_info(file: PathBuf) -> anyhow::Result<()> {
    let doc = open_pdf(&file).await?;

    println!("📄 {}", doc.path().display());
    println!("   Pages: {}", doc.page_count());

    Ok(())
}

/// Handle PDF extraction command
pub async fn handle_pdf_extract(
    file: PathBuf,
    page: Option<usize>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let doc = open_pdf(&file).await?;
    let stem = doc.stem();

    let (selection, text) = match page {
        Some(page) => (PageSelection::Single(page), doc.extract_page_text(page)?),
        None => (PageSelection::All, collect_all_pages(&doc)?),
    };

    let path = output.unwrap_or_else(|| {
        sibling_path(&file, output_file_name(Some(&stem), Some(selection), SOURCE_LANG))
    });
    write_text(&path, &text).await?;

    println!("✅ Extracted text saved: {}", path.display());

    Ok(())
}

/// Handle PDF translation command
pub async fn handle_pdf_translate(
    config: TranslatorConfig,
    file: PathBuf,
    page: Option<usize>,
    target_lang: String,
    output: Option<PathBuf>,
    max_new_tokens: Option<usize>,
) -> anyhow::Result<()> {
    let start_time = Instant::now();
    let target_lang: TargetLanguage = target_lang.parse()?;

    // Reject bad files and page numbers before paying for the model load
    let doc = open_pdf(&file).await?;
    let stem = doc.stem();
    let selection = match page {
        Some(page) => {
            crate::processors::pdf::check_page(page, doc.page_count())?;
            PageSelection::Single(page)
        }
        None => PageSelection::All,
    };

    info!("Starting PDF translation");
    info!("Input: {}", file.display());
    info!("Pages: {}", doc.page_count());
    info!("Target language: {}", target_lang);

    let session = load_session(apply_max_new_tokens(config, max_new_tokens)).await?;

    let unit = match selection {
        PageSelection::Single(_) => "lines",
        PageSelection::All => "pages",
    };
    let pb = progress_bar(doc.page_count() as u64, unit)?;
    let cancel = cancel_on_ctrl_c();

    let result = run_blocking({
        let on_progress = progress_updater(&pb);
        move || {
            let engine = session.engine().as_ref();
            let max_new_tokens = session.config().max_new_tokens;
            let is_cancelled = || cancel.is_cancelled();
            match selection {
                PageSelection::Single(page) => translate_page(
                    engine,
                    &doc,
                    page,
                    target_lang,
                    max_new_tokens,
                    on_progress,
                    is_cancelled,
                ),
                PageSelection::All => translate_all_pages(
                    engine,
                    &doc,
                    target_lang,
                    max_new_tokens,
                    on_progress,
                    is_cancelled,
                ),
            }
        }
    })
    .await;

    let Some(translated) = finish_run(result, &pb)? else {
        return Ok(());
    };

    let path = output.unwrap_or_else(|| {
        sibling_path(&file, output_file_name(Some(&stem), Some(selection), target_lang.code()))
    });
    write_text(&path, &translated).await?;

    println!("\n✅ Translation completed!");
    println!("   Saved: {}", path.display());
    println!("   Time: {:?}", start_time.elapsed());

    Ok(())
}

/// Handle server command
pub async fn handle_server(config: TranslatorConfig, host: String, port: u16) -> anyhow::Result<()> {
    use crate::server::api::run_server;

    info!("Starting HTTP server on {}:{}", host, port);
    println!("🚀 Server starting on http://{}:{}", host, port);

    run_server(host, port, config).await?;

    Ok(())
}

/// Handle model download command
pub async fn handle_download(
    config: TranslatorConfig,
    repo: Option<String>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    if config.offline {
        anyhow::bail!("Offline mode is enabled, refusing to download");
    }

    let repo = repo.unwrap_or_else(|| match &config.model_source {
        ModelSource::Remote(id) => id.clone(),
        ModelSource::Local(_) => DEFAULT_MODEL_ID.to_string(),
    });
    let target_dir = output.unwrap_or_else(|| config.cache_dir_for(&repo));

    let hub = HubClient::new(&config)?;
    let dir = hub.download_model(&repo, &target_dir, true).await?;

    println!("✅ Model {} downloaded to {}", repo, dir.display());
    println!("   Use it with: --model-dir {}", dir.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_max_new_tokens() {
        let config = apply_max_new_tokens(TranslatorConfig::default(), Some(128));
        assert_eq!(config.max_new_tokens, 128);

        let config = apply_max_new_tokens(TranslatorConfig::default(), None);
        assert_eq!(config.max_new_tokens, 256);
    }

    #[test]
    fn test_finish_run_treats_cancel_as_abort() {
        let pb = ProgressBar::hidden();
        assert_eq!(finish_run(Ok("done".to_string()), &pb).unwrap(), Some("done".to_string()));
        assert_eq!(finish_run(Err(TranslationError::Cancelled), &pb).unwrap(), None);
        assert!(finish_run(
            Err(TranslationError::Inference {
                message: "boom".to_string()
            }),
            &pb
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_pdf_extract_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = handle_pdf_extract(dir.path().join("missing.pdf"), Some(1), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to open document"));
    }

    #[tokio::test]
    async fn test_download_refused_offline() {
        let config = TranslatorConfig {
            offline: true,
            ..Default::default()
        };
        assert!(handle_download(config, None, None).await.is_err());
    }
}

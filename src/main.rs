//! Main entry point for the JA Translator CLI

#![forbid(unsafe_code)]

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ja_translator::cli::commands::{self, Commands};
use ja_translator::{ModelSource, TranslatorConfig};

/// JA Translator - offline Japanese to Vietnamese/English translation
#[derive(Parser, Debug)]
#[command(name = "ja-translator", version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Local model directory (overrides MODEL_DIR and --model-id)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Hub model id (default: Xenova/m2m100_418M, or MODEL_ID)
    #[arg(long, global = true)]
    model_id: Option<String>,

    /// Never touch the network; use only local or cached models
    #[arg(long, global = true)]
    offline: bool,

    /// JSON configuration file (replaces environment configuration)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl Args {
    /// Build the translator configuration, CLI flags taking precedence
    fn translator_config(&self) -> anyhow::Result<TranslatorConfig> {
        let mut config = match &self.config {
            Some(path) => TranslatorConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => TranslatorConfig::from_env()?,
        };

        if let Some(id) = &self.model_id {
            config.model_source = ModelSource::Remote(id.clone());
        }
        if let Some(dir) = &self.model_dir {
            config.model_source = ModelSource::Local(dir.clone());
        }
        if self.offline {
            config.offline = true;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("ja_translator={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.translator_config()?;

    let Some(command) = args.command else {
        println!("Please specify a command. Use --help for more information.");
        return Ok(());
    };

    // Execute command
    match command {
        Commands::Translate {
            file,
            text,
            target_lang,
            output,
            max_new_tokens,
        } => {
            commands::handle_translate(config, file, text, target_lang, output, max_new_tokens)
                .await?;
        }
        Commands::PdfInfo { file } => {
            commands::handle_pdf_info(file).await?;
        }
        Commands::PdfExtract { file, page, output } => {
            commands::handle_pdf_extract(file, page, output).await?;
        }
        Commands::PdfTranslate {
            file,
            page,
            target_lang,
            output,
            max_new_tokens,
        } => {
            commands::handle_pdf_translate(config, file, page, target_lang, output, max_new_tokens)
                .await?;
        }
        Commands::Server { host, port } => {
            commands::handle_server(config, host, port).await?;
        }
        Commands::Download { repo, output } => {
            commands::handle_download(config, repo, output).await?;
        }
    }

    Ok(())
}

//! JA Translator - offline Japanese to Vietnamese/English translation
//!
//! This library wraps an M2M-100 model running on ONNX Runtime and provides
//! line-segmented document translation, PDF page extraction, and the CLI and
//! HTTP front ends built on them.

#![forbid(unsafe_code)]

pub mod cli;
pub mod core;
pub mod processors;
pub mod server;

// Re-export key types for convenience
pub use core::{
    config::TranslatorConfig,
    engine::TranslationEngine,
    errors::TranslationError,
    models::{CancelToken, ModelSource, ProgressState, TargetLanguage, TranslationRequest},
    session::TranslationSession,
};

pub use processors::{
    lines::translate_document,
    pdf::{PageSource, PdfDocument},
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

//! Custom error types for translation operations

use thiserror::Error;

/// Translation-related errors
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Model location does not exist or is not reachable
    #[error("Model not found: {location}")]
    ModelNotFound {
        location: String,
    },

    /// Model files exist but could not be loaded
    #[error("Failed to load model: {message}")]
    ModelLoad {
        message: String,
    },

    /// Failure inside tokenization, graph execution or decoding
    #[error("Inference error: {message}")]
    Inference {
        message: String,
    },

    /// Source document could not be opened
    #[error("Failed to open document: {path} - {message}")]
    DocumentOpen {
        path: String,
        message: String,
    },

    /// Page index outside of the document
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange {
        page: usize,
        total: usize,
    },

    /// Run aborted by the user
    #[error("Translation cancelled by user")]
    Cancelled,

    /// Writing an output file failed
    #[error("Failed to save {path}: {source}")]
    Save {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Model download failed
    #[error("Download failed: {url} - {message}")]
    Download {
        url: String,
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
    },

    /// Request rejected before reaching the engine
    #[error("Invalid request: {message}")]
    InvalidRequest {
        message: String,
    },

    /// Wrapper for anyhow errors
    #[error("Internal error: {0}")]
    InternalError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Reqwest error
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl TranslationError {
    /// Whether the error is a user-initiated abort rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TranslationError::Cancelled)
    }

    /// Whether the error leaves the session without a usable engine
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            TranslationError::ModelNotFound { .. } | TranslationError::ModelLoad { .. }
        )
    }

    pub(crate) fn inference(err: impl std::fmt::Display) -> Self {
        TranslationError::Inference {
            message: err.to_string(),
        }
    }

    pub(crate) fn model_load(err: impl std::fmt::Display) -> Self {
        TranslationError::ModelLoad {
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for TranslationError {
    fn from(err: anyhow::Error) -> Self {
        TranslationError::InternalError(err.to_string())
    }
}

/// Result type for translation operations
pub type Result<T> = std::result::Result<T, TranslationError>;

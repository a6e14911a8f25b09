//! Core data models for translation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::errors::{Result, TranslationError};

/// Source language of every request
pub const SOURCE_LANG: &str = "ja";

/// Lower bound of the max-new-tokens control
pub const MIN_NEW_TOKENS: usize = 32;

/// Upper bound of the max-new-tokens control
pub const MAX_NEW_TOKENS: usize = 512;

/// Slider step of the max-new-tokens control
pub const NEW_TOKENS_STEP: usize = 32;

/// Default max-new-tokens value
pub const DEFAULT_NEW_TOKENS: usize = 256;

/// Supported target languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetLanguage {
    /// Vietnamese
    Vi,
    /// English
    En,
}

impl TargetLanguage {
    /// All selectable targets, in UI order
    pub const ALL: [TargetLanguage; 2] = [TargetLanguage::Vi, TargetLanguage::En];

    /// ISO 639-1 code
    pub fn code(&self) -> &'static str {
        match self {
            TargetLanguage::Vi => "vi",
            TargetLanguage::En => "en",
        }
    }

    /// Human readable name
    pub fn label(&self) -> &'static str {
        match self {
            TargetLanguage::Vi => "Vietnamese",
            TargetLanguage::En => "English",
        }
    }

    /// Language token in the M2M-100 vocabulary
    pub fn model_token(&self) -> String {
        language_token(self.code())
    }
}

impl fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for TargetLanguage {
    type Err = TranslationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vi" => Ok(TargetLanguage::Vi),
            "en" => Ok(TargetLanguage::En),
            other => Err(TranslationError::InvalidRequest {
                message: format!("Unsupported target language: {} (expected vi or en)", other),
            }),
        }
    }
}

/// M2M-100 language token for a language code
pub fn language_token(code: &str) -> String {
    format!("__{}__", code)
}

/// Where the model comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "location", rename_all = "lowercase")]
pub enum ModelSource {
    /// Directory on the local filesystem
    Local(PathBuf),
    /// Hub repository identifier, e.g. `Xenova/m2m100_418M`
    Remote(String),
}

impl ModelSource {
    /// Location string for messages
    pub fn location(&self) -> String {
        match self {
            ModelSource::Local(path) => path.display().to_string(),
            ModelSource::Remote(id) => id.clone(),
        }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Local(path) => write!(f, "local:{}", path.display()),
            ModelSource::Remote(id) => write!(f, "remote:{}", id),
        }
    }
}

/// Translation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub text: String,
    pub source_lang: String,
    pub target_lang: TargetLanguage,
    pub max_new_tokens: usize,
}

impl TranslationRequest {
    pub fn new(text: impl Into<String>, target_lang: TargetLanguage) -> Self {
        Self {
            text: text.into(),
            source_lang: SOURCE_LANG.to_string(),
            target_lang,
            max_new_tokens: DEFAULT_NEW_TOKENS,
        }
    }

    pub fn with_max_new_tokens(mut self, max_new_tokens: usize) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    /// Reject requests that must not reach the engine
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(TranslationError::InvalidRequest {
                message: "Text to translate is empty".to_string(),
            });
        }

        if !(MIN_NEW_TOKENS..=MAX_NEW_TOKENS).contains(&self.max_new_tokens) {
            return Err(TranslationError::InvalidRequest {
                message: format!(
                    "max_new_tokens must be between {} and {}, got {}",
                    MIN_NEW_TOKENS, MAX_NEW_TOKENS, self.max_new_tokens
                ),
            });
        }

        Ok(())
    }
}

/// Progress of a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressState {
    pub completed: usize,
    pub total: usize,
    pub cancelled: bool,
}

impl ProgressState {
    pub fn new(total: usize) -> Self {
        Self {
            completed: 0,
            total,
            cancelled: false,
        }
    }

    /// Completion ratio in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }
}

/// Cooperative cancellation flag shared between a shell and a running batch
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; honoured at the next checkpoint
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_language_parsing() {
        assert_eq!("vi".parse::<TargetLanguage>().unwrap(), TargetLanguage::Vi);
        assert_eq!(" EN ".parse::<TargetLanguage>().unwrap(), TargetLanguage::En);
        assert!("fr".parse::<TargetLanguage>().is_err());
    }

    #[test]
    fn test_language_tokens() {
        assert_eq!(TargetLanguage::Vi.model_token(), "__vi__");
        assert_eq!(TargetLanguage::En.model_token(), "__en__");
        assert_eq!(language_token(SOURCE_LANG), "__ja__");
    }

    #[test]
    fn test_request_validation() {
        let request = TranslationRequest::new("この製品は炭素鋼SS400を使用しています。", TargetLanguage::Vi);
        assert_eq!(request.source_lang, "ja");
        assert!(request.validate().is_ok());

        assert!(TranslationRequest::new("   \n", TargetLanguage::En).validate().is_err());
        assert!(TranslationRequest::new("テスト", TargetLanguage::En)
            .with_max_new_tokens(16)
            .validate()
            .is_err());
        assert!(TranslationRequest::new("テスト", TargetLanguage::En)
            .with_max_new_tokens(MAX_NEW_TOKENS)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_model_source_serde() {
        let source = ModelSource::Remote("Xenova/m2m100_418M".to_string());
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["kind"], "remote");
        assert_eq!(json["location"], "Xenova/m2m100_418M");

        let back: ModelSource = serde_json::from_value(json).unwrap();
        assert_eq!(back, source);
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_progress_fraction() {
        let mut state = ProgressState::new(4);
        state.completed = 1;
        assert!((state.fraction() - 0.25).abs() < f64::EPSILON);
        assert_eq!(ProgressState::new(0).fraction(), 1.0);
    }
}

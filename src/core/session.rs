//! Process-wide translation session

use std::sync::Arc;
use tracing::info;

use crate::core::config::TranslatorConfig;
use crate::core::engine::TranslationEngine;
use crate::core::errors::{Result, TranslationError};
use crate::core::hub::resolve_model_dir;
use crate::core::models::{CancelToken, ProgressState, TargetLanguage, TranslationRequest};
use crate::core::onnx::{EngineOptions, M2M100Engine};
use crate::processors::lines;

/// Owns the loaded engine for the lifetime of the process
#[derive(Clone)]
pub struct TranslationSession {
    engine: Arc<dyn TranslationEngine>,
    config: Arc<TranslatorConfig>,
}

impl std::fmt::Debug for TranslationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationSession")
            .field("engine", &self.engine.name())
            .field("model_source", &self.config.model_source)
            .finish()
    }
}

impl TranslationSession {
    /// Resolve the model source and load the engine once
    pub async fn load(config: TranslatorConfig) -> Result<Self> {
        config.validate().map_err(|e| TranslationError::ConfigError {
            message: e.to_string(),
        })?;

        let dir = resolve_model_dir(&config).await?;
        let options = EngineOptions::from(&config);

        info!("Loading translation model from {}", dir.display());

        let engine = tokio::task::spawn_blocking(move || M2M100Engine::load(&dir, &options))
            .await
            .map_err(|e| TranslationError::InternalError(e.to_string()))??;

        Ok(Self::with_engine(Arc::new(engine), config))
    }

    /// Wrap an already loaded engine
    pub fn with_engine(engine: Arc<dyn TranslationEngine>, config: TranslatorConfig) -> Self {
        Self {
            engine,
            config: Arc::new(config),
        }
    }

    pub fn engine(&self) -> &Arc<dyn TranslationEngine> {
        &self.engine
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.engine.name()
    }

    /// Translate a request as a single piece of text
    pub fn translate(&self, request: &TranslationRequest) -> Result<String> {
        request.validate()?;
        self.engine
            .translate_one(request.text.trim(), request.target_lang, request.max_new_tokens)
    }

    /// Translate a document line by line
    pub fn translate_document(
        &self,
        text: &str,
        target_lang: TargetLanguage,
        on_progress: impl FnMut(&ProgressState),
        cancel: &CancelToken,
    ) -> Result<String> {
        lines::translate_document(
            self.engine.as_ref(),
            text,
            target_lang,
            self.config.max_new_tokens,
            on_progress,
            || cancel.is_cancelled(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::testing::MockEngine;
    use crate::core::models::ModelSource;
    use std::path::PathBuf;

    fn session(engine: Arc<MockEngine>) -> TranslationSession {
        TranslationSession::with_engine(engine, TranslatorConfig::default())
    }

    #[test]
    fn test_load_nonexistent_path() {
        let config = TranslatorConfig {
            model_source: ModelSource::Local(PathBuf::from("/nonexistent/m2m100_418M")),
            use_gpu: false,
            ..Default::default()
        };

        let err = tokio_test::block_on(TranslationSession::load(config)).unwrap_err();
        assert!(matches!(err, TranslationError::ModelNotFound { .. }));
        assert!(err.is_fatal_to_session());
    }

    #[test]
    fn test_translate_trims_and_validates() {
        let engine = Arc::new(MockEngine::new(&[("こんにちは", "Xin chào")]));
        let session = session(engine.clone());

        let request = TranslationRequest::new("  こんにちは\n", TargetLanguage::Vi);
        assert_eq!(session.translate(&request).unwrap(), "Xin chào");

        let blank = TranslationRequest::new("   ", TargetLanguage::Vi);
        assert!(matches!(
            session.translate(&blank),
            Err(TranslationError::InvalidRequest { .. })
        ));
        assert_eq!(engine.calls(), 1);
    }

    #[test]
    fn test_translate_document_uses_cancel_token() {
        let engine = Arc::new(MockEngine::new(&[]));
        let session = session(engine.clone());
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = session
            .translate_document("一\n二\n三", TargetLanguage::En, |_| {}, &cancel)
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(engine.calls(), 1);
    }
}

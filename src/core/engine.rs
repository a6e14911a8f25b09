//! Translation engine abstraction

use crate::core::errors::Result;
use crate::core::models::TargetLanguage;

/// A loaded translation model.
///
/// Implementations are expensive to create and are shared for the lifetime of
/// the process. Calls are blocking; async callers go through
/// `tokio::task::spawn_blocking`.
pub trait TranslationEngine: Send + Sync {
    /// Translate a single piece of Japanese text
    fn translate_one(
        &self,
        text: &str,
        target_lang: TargetLanguage,
        max_new_tokens: usize,
    ) -> Result<String>;

    /// Name shown in logs and API responses
    fn name(&self) -> &str;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::core::errors::TranslationError;

    /// Engine backed by a lookup table that counts its calls
    #[derive(Debug, Default)]
    pub struct MockEngine {
        table: HashMap<String, String>,
        fail_on: Option<String>,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl MockEngine {
        pub fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                table: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                ..Default::default()
            }
        }

        pub fn failing_on(mut self, text: &str) -> Self {
            self.fail_on = Some(text.to_string());
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl TranslationEngine for MockEngine {
        fn translate_one(
            &self,
            text: &str,
            target_lang: TargetLanguage,
            _max_new_tokens: usize,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(text.to_string());

            if self.fail_on.as_deref() == Some(text) {
                return Err(TranslationError::Inference {
                    message: format!("mock failure on '{}'", text),
                });
            }

            Ok(self
                .table
                .get(text)
                .cloned()
                .unwrap_or_else(|| format!("[{}] {}", target_lang, text)))
        }

        fn name(&self) -> &str {
            "mock"
        }
    }
}

//! Page-by-page translation of a document

use tracing::{debug, info};

use crate::core::engine::TranslationEngine;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{ProgressState, TargetLanguage};
use crate::processors::export::append_page;
use crate::processors::lines;
use crate::processors::pdf::{PageSource, NO_EXTRACTABLE_TEXT};

/// Translated output of a page without text; the engine is not called for it
pub const NO_TRANSLATABLE_TEXT: &str = "[This page has no text to translate.]";

/// Whether page text is worth sending to the engine
pub fn has_translatable_text(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed != NO_EXTRACTABLE_TEXT
}

/// Translate already extracted page text, applying the no-text policy
pub fn translate_page_text(
    engine: &dyn TranslationEngine,
    text: &str,
    target_lang: TargetLanguage,
    max_new_tokens: usize,
    on_progress: impl FnMut(&ProgressState),
    is_cancelled: impl Fn() -> bool,
) -> Result<String> {
    if !has_translatable_text(text) {
        return Ok(NO_TRANSLATABLE_TEXT.to_string());
    }
    lines::translate_document(engine, text, target_lang, max_new_tokens, on_progress, is_cancelled)
}

/// Translate a single page (1-indexed), reporting per-line progress
pub fn translate_page(
    engine: &dyn TranslationEngine,
    source: &dyn PageSource,
    page: usize,
    target_lang: TargetLanguage,
    max_new_tokens: usize,
    on_progress: impl FnMut(&ProgressState),
    is_cancelled: impl Fn() -> bool,
) -> Result<String> {
    let text = source.extract_page_text(page)?;
    debug!("Translating page {} ({} chars)", page, text.len());
    translate_page_text(engine, &text, target_lang, max_new_tokens, on_progress, is_cancelled)
}

/// Translate every page into one text with page headers.
///
/// Progress is reported per page; cancellation is honoured between pages and
/// between lines of a page.
pub fn translate_all_pages(
    engine: &dyn TranslationEngine,
    source: &dyn PageSource,
    target_lang: TargetLanguage,
    max_new_tokens: usize,
    mut on_progress: impl FnMut(&ProgressState),
    is_cancelled: impl Fn() -> bool,
) -> Result<String> {
    let total = source.page_count();
    let mut state = ProgressState::new(total);
    let mut output = String::new();

    for page in 1..=total {
        if is_cancelled() {
            state.cancelled = true;
            on_progress(&state);
            return Err(TranslationError::Cancelled);
        }

        let text = source.extract_page_text(page)?;
        let translated = match translate_page_text(
            engine,
            &text,
            target_lang,
            max_new_tokens,
            |_| {},
            &is_cancelled,
        ) {
            Ok(translated) => translated,
            Err(TranslationError::Cancelled) => {
                debug!("Cancelled inside page {}/{}", page, total);
                state.cancelled = true;
                on_progress(&state);
                return Err(TranslationError::Cancelled);
            }
            Err(e) => return Err(e),
        };

        append_page(&mut output, page, total, &translated);

        state.completed = page;
        on_progress(&state);
    }

    info!("Translated {} pages to {}", total, target_lang);
    Ok(output)
}

/// Source text of every page with page headers
pub fn collect_all_pages(source: &dyn PageSource) -> Result<String> {
    let total = source.page_count();
    let mut output = String::new();

    for page in 1..=total {
        let text = source.extract_page_text(page)?;
        append_page(&mut output, page, total, &text);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::testing::MockEngine;
    use crate::processors::pdf::tests::StaticPages;
    use std::cell::Cell;

    fn three_pages() -> StaticPages {
        StaticPages(vec![
            "表紙".to_string(),
            String::new(),
            "本文\n\n結論".to_string(),
        ])
    }

    #[test]
    fn test_marker_page_is_not_translated() {
        let engine = MockEngine::new(&[("表紙", "Cover"), ("本文", "Body"), ("結論", "Conclusion")]);
        let source = three_pages();

        let out = translate_all_pages(&engine, &source, TargetLanguage::En, 256, |_| {}, || false)
            .unwrap();

        assert_eq!(
            out,
            format!(
                "===== page 1 / 3 =====\nCover\n\n\
                 ===== page 2 / 3 =====\n{}\n\n\
                 ===== page 3 / 3 =====\nBody\n\nConclusion\n\n",
                NO_TRANSLATABLE_TEXT
            )
        );
        assert_eq!(engine.seen(), vec!["表紙", "本文", "結論"]);
    }

    #[test]
    fn test_single_page_uses_same_policy() {
        let engine = MockEngine::new(&[]);
        let source = three_pages();

        let out = translate_page(&engine, &source, 2, TargetLanguage::Vi, 256, |_| {}, || false)
            .unwrap();
        assert_eq!(out, NO_TRANSLATABLE_TEXT);
        assert_eq!(engine.calls(), 0);

        assert!(matches!(
            translate_page(&engine, &source, 9, TargetLanguage::Vi, 256, |_| {}, || false),
            Err(TranslationError::PageOutOfRange { .. })
        ));
    }

    #[test]
    fn test_progress_per_page() {
        let engine = MockEngine::new(&[]);
        let mut completed = Vec::new();

        translate_all_pages(
            &engine,
            &three_pages(),
            TargetLanguage::Vi,
            256,
            |p| completed.push((p.completed, p.total)),
            || false,
        )
        .unwrap();

        assert_eq!(completed, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn test_cancel_between_pages() {
        let engine = MockEngine::new(&[]);
        let checks = Cell::new(0);
        let mut states = Vec::new();

        // First check passes page 1, the check after its only line cancels
        let err = translate_all_pages(
            &engine,
            &three_pages(),
            TargetLanguage::Vi,
            256,
            |p| states.push(*p),
            || {
                checks.set(checks.get() + 1);
                checks.get() > 1
            },
        )
        .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(engine.seen(), vec!["表紙"]);
        let last = states.last().unwrap();
        assert!(last.cancelled);
        assert_eq!(last.completed, 0);
    }

    #[test]
    fn test_cancel_inside_page_is_reported() {
        let engine = MockEngine::new(&[]);
        let source = StaticPages(vec!["a\nb\nc".to_string(), "d".to_string()]);
        let checks = Cell::new(0);
        let mut states = Vec::new();

        // Checks: before page 1, after "a", after "b" (cancels)
        let err = translate_all_pages(
            &engine,
            &source,
            TargetLanguage::En,
            256,
            |p| states.push(*p),
            || {
                checks.set(checks.get() + 1);
                checks.get() >= 3
            },
        )
        .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(engine.seen(), vec!["a", "b"]);
        assert_eq!(states.len(), 1);
        assert!(states[0].cancelled);
        assert_eq!(states[0].total, 2);
    }

    #[test]
    fn test_collect_all_pages() {
        let out = collect_all_pages(&three_pages()).unwrap();
        assert_eq!(
            out,
            format!(
                "===== page 1 / 3 =====\n表紙\n\n\
                 ===== page 2 / 3 =====\n{}\n\n\
                 ===== page 3 / 3 =====\n本文\n\n結論\n\n",
                NO_EXTRACTABLE_TEXT
            )
        );
    }

    #[test]
    fn test_has_translatable_text() {
        assert!(has_translatable_text("本文"));
        assert!(!has_translatable_text("  \n"));
        assert!(!has_translatable_text(NO_EXTRACTABLE_TEXT));
    }
}

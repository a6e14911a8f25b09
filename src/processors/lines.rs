//! Line-segmented document translation
//!
//! Each non-blank line is translated on its own so that every model call
//! stays within the context window and progress can be reported per line.
//! Blank lines are copied through and every line keeps its own terminator,
//! so the output has the same line layout as the input.

use tracing::debug;

use crate::core::engine::TranslationEngine;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{ProgressState, TargetLanguage};

/// Split a line into its content and its own terminator
fn split_terminator(line: &str) -> (&str, &str) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = line.strip_suffix('\n') {
        (content, "\n")
    } else {
        (line, "")
    }
}

/// Number of progress steps `translate_document` will report for `text`
pub fn line_count(text: &str) -> usize {
    if text.trim().is_empty() {
        0
    } else {
        text.split_inclusive('\n').count()
    }
}

/// Translate `text` line by line.
///
/// `on_progress` is called after every line. `is_cancelled` is polled after
/// every line; when it returns true the run stops with
/// [`TranslationError::Cancelled`] and nothing is returned.
pub fn translate_document(
    engine: &dyn TranslationEngine,
    text: &str,
    target_lang: TargetLanguage,
    max_new_tokens: usize,
    mut on_progress: impl FnMut(&ProgressState),
    is_cancelled: impl Fn() -> bool,
) -> Result<String> {
    if text.trim().is_empty() {
        return Ok(String::new());
    }

    let source_lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut state = ProgressState::new(source_lines.len());
    let mut output = String::with_capacity(text.len());

    for line in &source_lines {
        let (content, terminator) = split_terminator(line);
        if !content.trim().is_empty() {
            output.push_str(&engine.translate_one(content, target_lang, max_new_tokens)?);
        }
        output.push_str(terminator);

        state.completed += 1;
        on_progress(&state);

        if is_cancelled() {
            debug!("Cancelled after line {}/{}", state.completed, state.total);
            state.cancelled = true;
            on_progress(&state);
            return Err(TranslationError::Cancelled);
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::testing::MockEngine;
    use std::cell::Cell;

    fn run(engine: &MockEngine, text: &str) -> Result<String> {
        translate_document(engine, text, TargetLanguage::En, 256, |_| {}, || false)
    }

    #[test]
    fn test_blank_lines_are_preserved() {
        let engine = MockEngine::new(&[("Hello", "X"), ("World", "Y")]);
        assert_eq!(run(&engine, "Hello\n\nWorld").unwrap(), "X\n\nY");
        assert_eq!(engine.calls(), 2);
    }

    #[test]
    fn test_whitespace_only_lines_become_empty() {
        let engine = MockEngine::new(&[("a", "A"), ("b", "B")]);
        assert_eq!(run(&engine, "a\n   \t\nb").unwrap(), "A\n\nB");
    }

    #[test]
    fn test_structure_is_preserved() {
        let docs = [
            "一行目",
            "一行目\n二行目",
            "\n\n先頭に空行\n",
            "a\n\n\nb\n  \nc\n\n",
            "第1章\r\n\r\n本文です。\r\n",
        ];

        for doc in docs {
            let engine = MockEngine::new(&[]);
            let out = run(&engine, doc).unwrap();

            let input: Vec<&str> = doc.lines().collect();
            let output: Vec<&str> = out.lines().collect();
            assert_eq!(input.len(), output.len(), "line count for {:?}", doc);
            for (src, dst) in input.iter().zip(&output) {
                assert_eq!(src.trim().is_empty(), dst.is_empty(), "blank position in {:?}", doc);
            }
            assert_eq!(doc.ends_with('\n'), out.ends_with('\n'));
        }
    }

    #[test]
    fn test_crlf_convention_is_kept() {
        let engine = MockEngine::new(&[("上", "up"), ("下", "down")]);
        assert_eq!(run(&engine, "上\r\n\r\n下\r\n").unwrap(), "up\r\n\r\ndown\r\n");
    }

    #[test]
    fn test_mixed_line_endings_are_kept_per_line() {
        let engine = MockEngine::new(&[("a", "A"), ("b", "B"), ("c", "C")]);
        assert_eq!(run(&engine, "a\r\nb\nc\n").unwrap(), "A\r\nB\nC\n");
        assert_eq!(run(&engine, "a\n\r\nb").unwrap(), "A\n\r\nB");
    }

    #[test]
    fn test_whitespace_document_skips_engine() {
        let engine = MockEngine::new(&[]);
        assert_eq!(run(&engine, "").unwrap(), "");
        assert_eq!(run(&engine, " \n\t\n\n").unwrap(), "");
        assert_eq!(engine.calls(), 0);
    }

    #[test]
    fn test_progress_is_reported_per_line() {
        let engine = MockEngine::new(&[]);
        let mut seen = Vec::new();

        translate_document(
            &engine,
            "a\n\nb",
            TargetLanguage::Vi,
            256,
            |p| seen.push(*p),
            || false,
        )
        .unwrap();

        let completed: Vec<usize> = seen.iter().map(|p| p.completed).collect();
        assert_eq!(completed, vec![1, 2, 3]);
        assert!(seen.iter().all(|p| p.total == 3 && !p.cancelled));
        assert_eq!(line_count("a\n\nb"), 3);
    }

    #[test]
    fn test_cancellation_stops_after_current_line() {
        let engine = MockEngine::new(&[]);
        let checks = Cell::new(0);
        let mut last = ProgressState::default();

        // Cancel once line 2 has been processed
        let err = translate_document(
            &engine,
            "一\n二\n三\n四",
            TargetLanguage::Vi,
            256,
            |p| last = *p,
            || {
                checks.set(checks.get() + 1);
                checks.get() >= 2
            },
        )
        .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(engine.seen(), vec!["一", "二"]);
        assert_eq!(last.completed, 2);
        assert!(last.cancelled);
    }

    #[test]
    fn test_inference_error_aborts_run() {
        let engine = MockEngine::new(&[]).failing_on("二");
        let err = run(&engine, "一\n二\n三").unwrap_err();

        assert!(matches!(err, TranslationError::Inference { .. }));
        assert_eq!(engine.calls(), 2);
    }
}

//! Output naming and text file writing

use std::path::Path;
use tracing::info;

use crate::core::errors::{Result, TranslationError};

/// Which part of a document an output file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSelection {
    Single(usize),
    All,
}

/// Header line written before each page of a multi-page file
pub fn page_header(page: usize, total: usize) -> String {
    format!("===== page {} / {} =====", page, total)
}

/// Append one page block (`header`, text, blank line) to a multi-page buffer
pub fn append_page(buffer: &mut String, page: usize, total: usize, text: &str) {
    buffer.push_str(&page_header(page, total));
    buffer.push('\n');
    buffer.push_str(text);
    buffer.push_str("\n\n");
}

/// Deterministic output file name, `{stem}_{page?}_{lang}.txt`
pub fn output_file_name(stem: Option<&str>, selection: Option<PageSelection>, lang: &str) -> String {
    let stem = stem.filter(|s| !s.is_empty());
    match (stem, selection) {
        (Some(stem), Some(PageSelection::Single(page))) => format!("{}_page{}_{}.txt", stem, page, lang),
        (Some(stem), Some(PageSelection::All)) => format!("{}_all_pages_{}.txt", stem, lang),
        (Some(stem), None) => format!("{}_{}.txt", stem, lang),
        (None, Some(PageSelection::Single(_))) => format!("page_{}.txt", lang),
        (None, Some(PageSelection::All)) => format!("all_pages_{}.txt", lang),
        (None, None) => format!("text_{}.txt", lang),
    }
}

/// Write UTF-8 text, creating missing parent directories
pub async fn write_text(path: &Path, content: &str) -> Result<()> {
    let save_error = |source: std::io::Error| TranslationError::Save {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            tokio::fs::create_dir_all(parent).await.map_err(save_error)?;
        }
    }

    tokio::fs::write(path, content).await.map_err(save_error)?;

    info!("Saved {} ({} bytes)", path.display(), content.len());
    Ok(())
}

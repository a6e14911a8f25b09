//! PDF page source

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::errors::{Result, TranslationError};

/// Returned for pages that yield no text, e.g. image-only pages
pub const NO_EXTRACTABLE_TEXT: &str =
    "[No text could be extracted from this page. It may contain only images.]";

/// Page-indexed text, pages numbered from 1
pub trait PageSource {
    /// Number of pages
    fn page_count(&self) -> usize;

    /// Text of page `page` (1-indexed), or [`NO_EXTRACTABLE_TEXT`]
    fn extract_page_text(&self, page: usize) -> Result<String>;
}

/// Check a 1-indexed page number against a page count
pub fn check_page(page: usize, total: usize) -> Result<()> {
    if page == 0 || page > total {
        return Err(TranslationError::PageOutOfRange { page, total });
    }
    Ok(())
}

/// A PDF opened for text extraction
pub struct PdfDocument {
    path: PathBuf,
    document: lopdf::Document,
    page_numbers: Vec<u32>,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("path", &self.path)
            .field("pages", &self.page_numbers.len())
            .finish()
    }
}

impl PdfDocument {
    /// Open and parse a PDF file
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(TranslationError::DocumentOpen {
                path: path.display().to_string(),
                message: "File does not exist".to_string(),
            });
        }

        let document = lopdf::Document::load(path).map_err(|e| TranslationError::DocumentOpen {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();

        info!("Opened {} ({} pages)", path.display(), page_numbers.len());

        Ok(Self {
            path: path.to_path_buf(),
            document,
            page_numbers,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without extension, used for output names
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string())
    }
}

impl PageSource for PdfDocument {
    fn page_count(&self) -> usize {
        self.page_numbers.len()
    }

    fn extract_page_text(&self, page: usize) -> Result<String> {
        check_page(page, self.page_count())?;
        let page_number = self.page_numbers[page - 1];

        let text = match self.document.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(e) => {
                warn!("Text extraction failed on page {}: {}", page, e);
                String::new()
            }
        };

        if text.trim().is_empty() {
            debug!("Page {} has no extractable text", page);
            return Ok(NO_EXTRACTABLE_TEXT.to_string());
        }

        Ok(text)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// In-memory page source
    pub(crate) struct StaticPages(pub Vec<String>);

    impl PageSource for StaticPages {
        fn page_count(&self) -> usize {
            self.0.len()
        }

        fn extract_page_text(&self, page: usize) -> Result<String> {
            check_page(page, self.page_count())?;
            let text = &self.0[page - 1];
            if text.trim().is_empty() {
                return Ok(NO_EXTRACTABLE_TEXT.to_string());
            }
            Ok(text.clone())
        }
    }

    /// Write a PDF whose pages show the given strings; empty strings give
    /// pages without content
    fn write_pdf(path: &Path, pages: &[&str]) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let operations = if text.is_empty() {
                vec![]
            } else {
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(24)]),
                    Operation::new("Td", vec![Object::Integer(100), Object::Integer(600)]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ]
            };
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(595),
                    Object::Integer(842),
                ],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn test_open_missing_file() {
        let err = PdfDocument::open(Path::new("/nonexistent/manual.pdf")).unwrap_err();
        assert!(matches!(err, TranslationError::DocumentOpen { .. }));
    }

    #[test]
    fn test_open_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, "this is not a pdf").unwrap();

        let err = PdfDocument::open(&path).unwrap_err();
        assert!(matches!(err, TranslationError::DocumentOpen { .. }));
    }

    #[test]
    fn test_pages_and_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manual.pdf");
        write_pdf(&path, &["Hello World!", "", "Page three"]);

        let doc = PdfDocument::open(&path).unwrap();
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.stem(), "manual");

        assert!(doc.extract_page_text(1).unwrap().contains("Hello World!"));
        assert_eq!(doc.extract_page_text(2).unwrap(), NO_EXTRACTABLE_TEXT);
        assert!(matches!(
            doc.extract_page_text(4),
            Err(TranslationError::PageOutOfRange { page: 4, total: 3 })
        ));
        assert!(doc.extract_page_text(0).is_err());
    }
}

//! Page-level text extraction.
//!
//! Turns a file's bytes into the [`Page`] sequence the chunker consumes.
//! Page numbers are 1-based and follow the document's own order; pages
//! with no text are dropped but do not shift the numbering.
//!
//! | Extension | Pages |
//! |-----------|-------|
//! | `.pdf` | one per PDF page (`pdf-extract`) |
//! | `.txt`, `.md`, `.markdown` | split on form feed (`\x0c`); no form feed = one page |

use std::path::Path;

use thiserror::Error;

use research_rag_core::models::Page;

pub const PAGE_BREAK: char = '\x0c';

/// Extraction failure. The ingest pipeline logs it and skips the file.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Text,
}

impl SourceKind {
    /// Classify by extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(SourceKind::Pdf),
            "txt" | "md" | "markdown" => Some(SourceKind::Text),
            _ => None,
        }
    }
}

/// Extract the non-empty pages of `bytes`, labelled with `source_file`.
pub fn extract_pages(
    bytes: &[u8],
    kind: SourceKind,
    source_file: &str,
) -> Result<Vec<Page>, ExtractError> {
    let raw_pages = match kind {
        SourceKind::Pdf => pdf_extract::extract_text_from_mem_by_pages(bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string()))?,
        SourceKind::Text => String::from_utf8_lossy(bytes)
            .split(PAGE_BREAK)
            .map(str::to_string)
            .collect(),
    };

    Ok(raw_pages
        .into_iter()
        .zip(1u32..)
        .filter(|(text, _)| !text.trim().is_empty())
        .map(|(text, page_number)| Page {
            text,
            page_number,
            source_file: source_file.to_string(),
        })
        .collect())
}

/// Extract pages from a file on disk, classifying it by extension.
pub fn extract_file(path: &Path, source_file: &str) -> anyhow::Result<Vec<Page>> {
    let kind = SourceKind::from_path(path)
        .ok_or_else(|| ExtractError::Unsupported(path.display().to_string()))?;
    let bytes = std::fs::read(path)?;
    Ok(extract_pages(&bytes, kind, source_file)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(SourceKind::from_path(Path::new("a/B.PDF")), Some(SourceKind::Pdf));
        assert_eq!(SourceKind::from_path(Path::new("notes.md")), Some(SourceKind::Text));
        assert_eq!(SourceKind::from_path(Path::new("image.png")), None);
        assert_eq!(SourceKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_text_pages_split_on_form_feed() {
        let pages = extract_pages(b"first page\x0c\x0c  \x0cfourth page", SourceKind::Text, "t.txt")
            .unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[1].page_number, 4);
        assert_eq!(pages[1].text, "fourth page");
        assert_eq!(pages[1].source_file, "t.txt");
    }

    #[test]
    fn test_text_without_break_is_one_page() {
        let pages = extract_pages(b"just text", SourceKind::Text, "t.txt").unwrap();
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn test_invalid_pdf_returns_error() {
        let err = extract_pages(b"not a pdf", SourceKind::Pdf, "x.pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn test_unsupported_file_errors() {
        let err = extract_file(Path::new("/nonexistent/photo.png"), "photo.png").unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }
}

//! Format-specific text loading.
//!
//! Picks an extractor by file extension. PDFs go through `pdf-extract` one
//! page at a time, so every page becomes its own [`TextUnit`] tagged with its
//! page number; `.txt` and `.md` are read as UTF-8 into a single unit.
//! Extraction never panics; failures come back as [`ExtractError`] so the
//! pipeline can skip the file and move on.

use std::path::Path;

use crate::validate::normalized_extension;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Loaded text ready for chunking: a whole text file, or one PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    pub text: String,
    /// 1-based page number, for PDFs.
    pub page: Option<usize>,
}

/// Load the text units of a file, normalized for chunking.
pub fn load_units(path: &Path) -> Result<Vec<TextUnit>, ExtractError> {
    let extension = normalized_extension(path);
    match extension.as_str() {
        ".pdf" => {
            let bytes = std::fs::read(path)?;
            Ok(page_units(extract_pdf_pages(&bytes)?))
        }
        ".txt" | ".md" => Ok(vec![TextUnit {
            text: normalize_text(&std::fs::read_to_string(path)?),
            page: None,
        }]),
        _ => Err(ExtractError::Unsupported(extension)),
    }
}

/// Raw text of each page, in page order.
pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn page_units(pages: Vec<String>) -> Vec<TextUnit> {
    pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| TextUnit {
            text: normalize_text(&text),
            page: Some(i + 1),
        })
        .collect()
}

/// Unify line endings and drop a leading byte-order mark.
pub fn normalize_text(text: &str) -> String {
    text.trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn normalizes_line_endings() {
        assert_eq!(normalize_text("\u{feff}a\r\nb\rc\n"), "a\nb\nc\n");
    }

    #[test]
    fn loads_plain_text_and_markdown() {
        let tmp = TempDir::new().unwrap();
        let txt = tmp.path().join("a.TXT");
        std::fs::write(&txt, "line one\r\nline two").unwrap();
        assert_eq!(
            load_units(&txt).unwrap(),
            vec![TextUnit {
                text: "line one\nline two".to_string(),
                page: None
            }]
        );

        let md = tmp.path().join("b.md");
        std::fs::write(&md, "# Title\n\nBody").unwrap();
        assert_eq!(load_units(&md).unwrap()[0].text, "# Title\n\nBody");
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_pdf_pages(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));

        let tmp = TempDir::new().unwrap();
        let pdf = tmp.path().join("broken.pdf");
        std::fs::write(&pdf, b"%PDF-1.4 truncated").unwrap();
        assert!(matches!(load_units(&pdf), Err(ExtractError::Pdf(_))));
    }

    #[test]
    fn pages_numbered_from_one() {
        let units = page_units(vec![
            "First page\r\ntext".to_string(),
            String::new(),
            "Third page".to_string(),
        ]);
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].text, "First page\ntext");
        assert_eq!(units[0].page, Some(1));
        assert_eq!(units[1].page, Some(2));
        assert_eq!(units[2].page, Some(3));
        assert_eq!(units[2].text, "Third page");
    }

    #[test]
    fn unsupported_and_unreadable() {
        let tmp = TempDir::new().unwrap();
        let csv = tmp.path().join("x.csv");
        std::fs::write(&csv, "a,b").unwrap();
        assert!(matches!(load_units(&csv), Err(ExtractError::Unsupported(_))));

        let bin = tmp.path().join("bin.txt");
        std::fs::write(&bin, [0xff, 0xfe, 0xfd]).unwrap();
        assert!(matches!(load_units(&bin), Err(ExtractError::Io(_))));
    }
}

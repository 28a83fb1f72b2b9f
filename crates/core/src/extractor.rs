use crate::error::ParseError;
use lopdf::Document;
use std::path::Path;

/// Ordered text content of one source page, 1-based numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Seam for substituting the PDF backend in tests or alternative
/// parsers later.
pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, ParseError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, ParseError> {
        let document =
            Document::load(path).map_err(|error| ParseError::Malformed(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| ParseError::Malformed(error.to_string()))?;

            let trimmed = text.trim();
            if !trimmed.is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text: trimmed.to_string(),
                });
            }
        }

        if pages.is_empty() {
            return Err(ParseError::NoText(path.to_path_buf()));
        }

        Ok(pages)
    }
}

/// Convenience entry point used by the pipeline. Parse failures are
/// final: re-reading corrupt bytes cannot succeed, so nothing here
/// retries.
pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, ParseError> {
    LopdfExtractor.extract_pages(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn corrupt_bytes_fail_with_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.pdf");
        std::fs::File::create(&path)
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%broken"))
            .expect("write file");

        let error = extract_page_texts(&path).expect_err("must fail");
        assert!(matches!(error, ParseError::Malformed(_)));
    }

    #[test]
    fn missing_file_fails_with_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = extract_page_texts(&dir.path().join("absent.pdf")).expect_err("must fail");
        assert!(matches!(error, ParseError::Malformed(_)));
    }
}

use crate::error::FolioError;
use lopdf::Document as LoDocument;
use std::path::Path;

/// Reads the plain text of every page of a rendered fragment.
pub trait TextExtractor: Send + Sync {
    /// One string per physical page, page 1 first.
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, FolioError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfTextExtractor;

impl TextExtractor for LopdfTextExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, FolioError> {
        let extraction_err = |message: String| FolioError::Extraction {
            path: path.to_path_buf(),
            message,
        };
        let doc = LoDocument::load(path).map_err(|err| extraction_err(err.to_string()))?;
        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        let mut pages = Vec::with_capacity(page_numbers.len());
        for page_number in page_numbers {
            let text = doc
                .extract_text(&[page_number])
                .map_err(|err| extraction_err(format!("page {page_number}: {err}")))?;
            pages.push(text);
        }
        Ok(pages)
    }
}

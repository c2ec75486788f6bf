use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text from page {page}: {message}")]
    PageError { page: usize, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for PDF text extraction backends.
///
/// Implementors open a document and hand back a [`PageSource`] that yields
/// plain text one page at a time, so callers can report progress per page.
pub trait PdfBackend: Send + Sync {
    /// Open the document at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn PageSource>, BackendError>;
}

/// An opened document, read page by page.
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Extract the text of the page at zero-based `index`.
    fn page_text(&mut self, index: usize) -> Result<String, BackendError>;
}

/// Backend for plain UTF-8 text documents with form-feed (`\x0C`) page breaks.
///
/// Used by tests and by the CLI when a document has already been converted to
/// text. An empty file has no pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextBackend;

struct TextPages {
    pages: Vec<String>,
}

impl PdfBackend for PlainTextBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn PageSource>, BackendError> {
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8(bytes)
            .map_err(|e| BackendError::OpenError(format!("not UTF-8 text: {}", e)))?;
        Ok(Box::new(TextPages::from_text(&text)))
    }
}

impl TextPages {
    fn from_text(text: &str) -> Self {
        let pages = if text.is_empty() {
            Vec::new()
        } else {
            text.split('\x0C').map(str::to_string).collect()
        };
        Self { pages }
    }
}

impl PageSource for TextPages {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&mut self, index: usize) -> Result<String, BackendError> {
        self.pages
            .get(index)
            .cloned()
            .ok_or_else(|| BackendError::PageError {
                page: index + 1,
                message: "no such page".into(),
            })
    }
}

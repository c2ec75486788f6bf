use std::path::Path;

use mupdf::{Document, TextPageFlags};

use benford_core::{BackendError, PageSource, PdfBackend};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate is the sole AGPL island: it isolates the mupdf dependency
/// (which is AGPL-3.0) so that the core and the stores do not transitively
/// depend on it.
///
/// Every line of text on a page is extracted by default. Running headers and
/// footers often carry page numbers and dates, which land in the digit counts;
/// [`with_footer_exclusion`](Self::with_footer_exclusion) and
/// [`with_header_exclusion`](Self::with_header_exclusion) drop text blocks in
/// those bands.
#[derive(Debug, Clone, Copy, Default)]
pub struct MupdfBackend {
    /// Fraction of page height from bottom to exclude as footer (0.0–1.0).
    footer_exclusion_ratio: Option<f32>,
    /// Fraction of page height from top to exclude as header (0.0–1.0).
    header_exclusion_ratio: Option<f32>,
}

impl MupdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the footer exclusion ratio. Pass `0.0` to disable.
    pub fn with_footer_exclusion(mut self, ratio: f32) -> Self {
        self.footer_exclusion_ratio = if ratio > 0.0 { Some(ratio) } else { None };
        self
    }

    /// Set the header exclusion ratio. Pass `0.0` to disable.
    pub fn with_header_exclusion(mut self, ratio: f32) -> Self {
        self.header_exclusion_ratio = if ratio > 0.0 { Some(ratio) } else { None };
        self
    }
}

impl PdfBackend for MupdfBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn PageSource>, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;

        let document =
            Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))?;
        let count = document
            .page_count()
            .map_err(|e| BackendError::OpenError(e.to_string()))?;
        let page_count = usize::try_from(count)
            .map_err(|_| BackendError::OpenError(format!("invalid page count {}", count)))?;

        tracing::debug!(path = %path.display(), page_count, "PDF opened");
        Ok(Box::new(MupdfPages {
            document,
            page_count,
            bands: *self,
        }))
    }
}

struct MupdfPages {
    document: Document,
    page_count: usize,
    bands: MupdfBackend,
}

impl PageSource for MupdfPages {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_text(&mut self, index: usize) -> Result<String, BackendError> {
        let page_error = |message: String| BackendError::PageError {
            page: index + 1,
            message,
        };

        let number = i32::try_from(index).map_err(|_| page_error("page index out of range".into()))?;
        let page = self
            .document
            .load_page(number)
            .map_err(|e| page_error(e.to_string()))?;
        let text_page = page
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| page_error(e.to_string()))?;

        let bounds = page.bounds().map_err(|e| page_error(e.to_string()))?;
        let height = bounds.y1 - bounds.y0;
        let header_threshold = self.bands.header_exclusion_ratio.map(|r| bounds.y0 + height * r);
        let footer_threshold = self.bands.footer_exclusion_ratio.map(|r| bounds.y1 - height * r);

        let mut text = String::new();
        for block in text_page.blocks() {
            let block_bounds = block.bounds();

            // Blocks entirely within the header band
            if header_threshold.is_some_and(|t| block_bounds.y1 <= t) {
                continue;
            }
            // Blocks whose top edge is in the footer band
            if footer_threshold.is_some_and(|t| block_bounds.y0 >= t) {
                continue;
            }

            for line in block.lines() {
                text.extend(line.chars().map(|c| c.char().unwrap_or('\u{FFFD}')));
                text.push('\n');
            }
        }
        Ok(text)
    }
}

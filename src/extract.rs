//! Text extraction for incoming PDFs.
//!
//! The text layer is read page by page with lopdf. When it yields nothing
//! (scanned documents), every page is rasterized and run through OCR.
//! Failures at either stage are logged and degrade to an empty string,
//! unless the file is not a readable PDF and OCR produced nothing either.

use std::path::Path;
use tracing::{debug, info, warn};

use crate::ocr::OcrEngine;

/// Extraction error for the text-layer stage.
#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
    Encrypted,
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF parsing failed: {}", e),
            ExtractError::Encrypted => write!(f, "PDF is encrypted"),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Returns the text of a document. An empty string means "no extractable text".
///
/// An error means the file could not be read as a PDF by any strategy.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError>;
}

/// Text-layer extraction with optional OCR fallback.
pub struct PdfTextExtractor {
    ocr: Option<Box<dyn OcrEngine>>,
}

impl PdfTextExtractor {
    pub fn new(ocr: Option<Box<dyn OcrEngine>>) -> Self {
        Self { ocr }
    }

    /// OCR text, or `None` when OCR is disabled or failed.
    fn extract_with_ocr(&self, path: &Path) -> Option<String> {
        let Some(ocr) = &self.ocr else {
            debug!(path = %path.display(), "OCR disabled; no text extracted");
            return None;
        };
        match ocr.recognize_pages(path) {
            Ok(pages) => Some(join_ocr_pages(&pages)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "OCR extraction failed");
                None
            }
        }
    }
}

impl TextExtractor for PdfTextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        let layer = text_layer_pages(path);
        let text = match &layer {
            Ok(pages) => pages.concat(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "text layer extraction failed");
                String::new()
            }
        };

        if !text.trim().is_empty() {
            return Ok(text);
        }

        info!(path = %path.display(), "no text layer; falling back to OCR");
        match (self.extract_with_ocr(path), layer) {
            (Some(ocr_text), _) => Ok(ocr_text),
            (None, Ok(_)) => Ok(String::new()),
            (None, Err(e)) => Err(e),
        }
    }
}

/// Reads the text layer of every page. A page that fails to decode is empty.
pub fn text_layer_pages(path: &Path) -> Result<Vec<String>, ExtractError> {
    let doc = lopdf::Document::load(path).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    if doc.is_encrypted() {
        return Err(ExtractError::Encrypted);
    }

    let mut pages = Vec::new();
    for page_number in doc.get_pages().keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(text) => pages.push(text),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    page = page_number,
                    error = %e,
                    "page text extraction failed"
                );
                pages.push(String::new());
            }
        }
    }
    Ok(pages)
}

/// Joins OCR output, terminating every page with a newline.
fn join_ocr_pages(pages: &[String]) -> String {
    let mut out = String::new();
    for page in pages {
        out.push_str(page);
        out.push('\n');
    }
    out
}

/// Truncates `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

// src/checker/pdf.rs
// =============================================================================
// Text extraction from downloaded PDFs, limited to the first few pages.
//
// We use the `pdf-extract` crate. It can panic on some broken fonts/glyphs,
// so every call is wrapped in catch_unwind and a panic is reported as its
// own outcome instead of tearing down the worker.
// =============================================================================

use pdf_extract::{output_doc_page, Document, OutputError, PlainTextOutput};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// What came out of a PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfText {
    /// The file parsed; text of the leading pages joined by newlines
    /// (possibly empty for scanned documents)
    Text(String),
    /// The file could not be parsed (corrupt, truncated, encrypted)
    Unreadable(String),
    /// The parser panicked
    Crashed,
}

/// Extracts the text of the first `max_pages` pages. Later pages are
/// never parsed.
pub fn extract_leading_pages(bytes: &[u8], max_pages: usize) -> PdfText {
    let outcome = catch_unwind(AssertUnwindSafe(|| leading_pages_text(bytes, max_pages)));

    match outcome {
        Ok(Ok(text)) => PdfText::Text(text),
        Ok(Err(e)) => {
            tracing::debug!("PDF could not be parsed: {}", e);
            PdfText::Unreadable(e.to_string())
        }
        Err(_) => {
            tracing::warn!("PDF parser panicked");
            PdfText::Crashed
        }
    }
}

fn leading_pages_text(bytes: &[u8], max_pages: usize) -> Result<String, OutputError> {
    let mut doc = Document::load_mem(bytes)?;
    if doc.is_encrypted() {
        // Owner-password-only files open with the empty user password
        doc.decrypt("")?;
    }

    let page_count = doc.get_pages().len();
    let mut pages = Vec::new();
    for page_num in 1..=max_pages.min(page_count) {
        let mut text = String::new();
        let rendered = output_doc_page(&doc, &mut PlainTextOutput::new(&mut text), page_num as u32);
        match rendered {
            Ok(()) => pages.push(text),
            Err(e) if pages.is_empty() => return Err(e),
            // Keep what the earlier pages gave
            Err(e) => {
                tracing::debug!("stopping at PDF page {}: {}", page_num, e);
                break;
            }
        }
    }
    Ok(pages.join("\n"))
}

/// True when the extracted text is long enough to count as a real text
/// layer: more than `min_chars` characters once surrounding whitespace is
/// trimmed.
pub fn has_text_layer(text: &str, min_chars: usize) -> bool {
    text.trim().chars().count() > min_chars
}

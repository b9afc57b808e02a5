// src/checker/content.rs
// =============================================================================
// The content classifier: decides what kind of document a working link
// serves, and searches its text for the configured keywords.
//
// Format precedence (content type OR file extension, case-insensitive):
// 1. xml / json / rdf / csv          -> OpenStructuredFormat
// 2. pdf  -> text of the first pages -> ReadablePdf / ImageOnlyPdf / CorruptPdf
// 3. html                            -> Html (or HtmlWithErrors)
// 4. anything else                   -> NonStandardFormat(ext)
//
// Only the PDF and HTML branches produce text, so only they are searched.
// =============================================================================

use super::html::extract_html_text;
use super::pdf::{extract_leading_pages, has_text_layer, PdfText};
use crate::audit::{FormatQuality, KeywordHits};
use url::Url;

const STRUCTURED: [&str; 4] = ["xml", "json", "rdf", "csv"];

/// Limits for the classifier.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Only the first pages of a PDF are read
    pub max_pdf_pages: usize,
    /// A PDF needs more than this many non-whitespace-trimmed characters
    /// to count as readable
    pub min_readable_chars: usize,
    /// Extracted text is cut off after this many characters before searching
    pub max_text_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            max_pdf_pages: 3,
            min_readable_chars: 5,
            max_text_chars: 100_000,
        }
    }
}

/// Format verdict and keyword outcome for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub format: FormatQuality,
    pub hits: KeywordHits,
}

// What the content type / extension says the document is
#[derive(Debug, Clone, PartialEq, Eq)]
enum DocumentKind {
    Structured(String),
    Pdf,
    Html,
    Other(String),
}

/// Classifies a downloaded body and, when `search_enabled`, searches it.
///
/// `keywords` must already be lowercase.
pub fn classify(
    body: &[u8],
    content_type: Option<&str>,
    url: &str,
    search_enabled: bool,
    keywords: &[String],
    config: &ClassifierConfig,
) -> Classification {
    let not_searched = if search_enabled {
        KeywordHits::NotApplicable
    } else {
        KeywordHits::NotRequested
    };

    match detect_kind(content_type, url) {
        DocumentKind::Structured(ext) => Classification {
            format: FormatQuality::OpenStructuredFormat(ext),
            hits: not_searched,
        },

        DocumentKind::Pdf => match extract_leading_pages(body, config.max_pdf_pages) {
            PdfText::Text(text) if has_text_layer(&text, config.min_readable_chars) => Classification {
                format: FormatQuality::ReadablePdf,
                hits: search(&text, search_enabled, keywords, config),
            },
            PdfText::Text(_) => Classification {
                format: FormatQuality::ImageOnlyPdf,
                hits: if search_enabled {
                    KeywordHits::Unsearchable
                } else {
                    KeywordHits::NotRequested
                },
            },
            PdfText::Unreadable(_) => Classification {
                format: FormatQuality::CorruptPdf,
                hits: not_searched,
            },
            PdfText::Crashed => Classification {
                format: FormatQuality::ProcessingError,
                hits: not_searched,
            },
        },

        DocumentKind::Html => {
            let extracted = extract_html_text(body);
            Classification {
                format: if extracted.degraded {
                    FormatQuality::HtmlWithErrors
                } else {
                    FormatQuality::Html
                },
                hits: search(&extracted.text, search_enabled, keywords, config),
            }
        }

        DocumentKind::Other(ext) => Classification {
            format: FormatQuality::NonStandardFormat(ext),
            hits: not_searched,
        },
    }
}

/// Case-insensitive substring search. Hits come back in keyword order.
pub fn find_keywords(text: &str, keywords: &[String], max_chars: usize) -> Vec<String> {
    let haystack: String = text.chars().take(max_chars).collect::<String>().to_lowercase();
    keywords
        .iter()
        .filter(|k| haystack.contains(k.to_lowercase().as_str()))
        .cloned()
        .collect()
}

fn search(text: &str, enabled: bool, keywords: &[String], config: &ClassifierConfig) -> KeywordHits {
    if !enabled {
        return KeywordHits::NotRequested;
    }
    KeywordHits::Matches(find_keywords(text, keywords, config.max_text_chars))
}

fn detect_kind(content_type: Option<&str>, url: &str) -> DocumentKind {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
        .unwrap_or_default();
    let ext = url_extension(url);

    if let Some(kind) = ext.as_deref().filter(|e| STRUCTURED.contains(e)) {
        return DocumentKind::Structured(kind.to_string());
    }
    if let Some(kind) = structured_mime(&mime) {
        return DocumentKind::Structured(kind.to_string());
    }

    if ext.as_deref() == Some("pdf") || matches!(mime.as_str(), "application/pdf" | "application/x-pdf") {
        return DocumentKind::Pdf;
    }

    if matches!(ext.as_deref(), Some("html" | "htm"))
        || matches!(mime.as_str(), "text/html" | "application/xhtml+xml")
    {
        return DocumentKind::Html;
    }

    let label = ext
        .or_else(|| mime.rsplit('/').next().filter(|s| !s.is_empty()).map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());
    DocumentKind::Other(label)
}

// Maps a MIME type onto one of the open structured formats
fn structured_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "application/rdf+xml" | "text/rdf" => Some("rdf"),
        "application/json" | "text/json" => Some("json"),
        "application/xml" | "text/xml" => Some("xml"),
        "text/csv" | "application/csv" => Some("csv"),
        // +json / +xml suffixes (ld+json, atom+xml, ...), but not xhtml
        m if m.ends_with("+json") => Some("json"),
        m if m.ends_with("+xml") && m != "application/xhtml+xml" => Some("xml"),
        _ => None,
    }
}

/// Lowercased extension of the last path segment, if it has one.
fn url_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.last()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

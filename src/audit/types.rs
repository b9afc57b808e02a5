// src/audit/types.rs
// =============================================================================
// Data model shared by every stage of the audit pipeline.
//
// - AuditTask: one cell that carries a URL, plus the run's keywords/options
// - AuditResult: the terminal outcome for exactly one AuditTask
// - Reachability / FormatQuality / KeywordHits: the enumerated outcomes
//
// The three outcome enums implement Display and FromStr with matching text
// forms. The checkpoint log stores results as text, and reading them back
// on resume goes through FromStr.
// =============================================================================

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Switches chosen for one audit run. Read-only while the run is going.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditOptions {
    /// Download working links and classify their format/quality
    pub enable_format_audit: bool,
    /// Download working links and search their text for keywords
    pub enable_content_search: bool,
    /// Sleep a random delay before every request
    pub stealth_delay: bool,
}

impl AuditOptions {
    /// True when the run needs the full response body (GET) instead of the
    /// HEAD-only liveness probe.
    pub fn needs_body(&self) -> bool {
        self.enable_format_audit || self.enable_content_search
    }
}

/// One unit of work: a single cell that carries a URL.
#[derive(Debug, Clone, Serialize)]
pub struct AuditTask {
    pub sheet_name: String,
    pub cell_reference: String,
    pub url: String,
    pub cell_text: String,
    /// Lowercased search terms, shared by every task of the run
    #[serde(skip)]
    pub keywords: Arc<[String]>,
    #[serde(skip)]
    pub options: AuditOptions,
}

impl AuditTask {
    /// The (sheet, cell, url) triple that ties a result back to its task.
    pub fn key(&self) -> TaskKey {
        TaskKey::new(&self.sheet_name, &self.cell_reference, &self.url)
    }
}

/// Identity of a task, used to skip already-recorded work on resume.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub sheet_name: String,
    pub cell_reference: String,
    pub url: String,
}

impl TaskKey {
    pub fn new(sheet_name: &str, cell_reference: &str, url: &str) -> Self {
        TaskKey {
            sheet_name: sheet_name.to_string(),
            cell_reference: cell_reference.to_string(),
            url: url.to_string(),
        }
    }
}

/// Outcome of the HTTP liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum Reachability {
    /// 200 OK
    Reachable,
    /// 404
    NotFound,
    /// 403
    Forbidden,
    /// Any other HTTP status
    ServerError(u16),
    /// DNS failure, connection refused or reset
    NetworkFailure,
    /// The client-side timeout was exceeded
    Timeout,
    /// Anything else (invalid URL, redirect loop, ...)
    UnknownFailure,
}

impl Reachability {
    /// Maps an HTTP status code onto the enumerated outcome.
    pub fn from_status(status: u16) -> Self {
        match status {
            200 => Reachability::Reachable,
            404 => Reachability::NotFound,
            403 => Reachability::Forbidden,
            other => Reachability::ServerError(other),
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, Reachability::Reachable)
    }

    /// Human-readable status used in the table and in the "Status" column.
    pub fn status_text(&self) -> String {
        match self {
            Reachability::Reachable => "ACTIVE".to_string(),
            Reachability::NotFound => "BROKEN (404)".to_string(),
            Reachability::Forbidden => "FORBIDDEN (403)".to_string(),
            Reachability::ServerError(code) => format!("STATUS {}", code),
            Reachability::NetworkFailure => "CONNECTION ERROR".to_string(),
            Reachability::Timeout => "TIMEOUT".to_string(),
            Reachability::UnknownFailure => "ERROR".to_string(),
        }
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reachability::Reachable => f.write_str("Reachable"),
            Reachability::NotFound => f.write_str("NotFound"),
            Reachability::Forbidden => f.write_str("Forbidden"),
            Reachability::ServerError(code) => write!(f, "ServerError({})", code),
            Reachability::NetworkFailure => f.write_str("NetworkFailure"),
            Reachability::Timeout => f.write_str("Timeout"),
            Reachability::UnknownFailure => f.write_str("UnknownFailure"),
        }
    }
}

impl FromStr for Reachability {
    type Err = ParseOutcomeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Reachable" => Ok(Reachability::Reachable),
            "NotFound" => Ok(Reachability::NotFound),
            "Forbidden" => Ok(Reachability::Forbidden),
            "NetworkFailure" => Ok(Reachability::NetworkFailure),
            "Timeout" => Ok(Reachability::Timeout),
            "UnknownFailure" => Ok(Reachability::UnknownFailure),
            other => wrapped(other, "ServerError")
                .and_then(|code| code.parse::<u16>().ok())
                .map(Reachability::ServerError)
                .ok_or_else(|| ParseOutcomeError::new("reachability", s)),
        }
    }
}

/// Format/quality verdict of a downloaded document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "ext", rename_all = "snake_case")]
pub enum FormatQuality {
    /// Format audit was not enabled for this run
    NotRequested,
    /// Format audit was enabled but the link was not reachable
    Unreachable,
    /// xml, json, rdf or csv
    OpenStructuredFormat(String),
    /// PDF with a text layer
    ReadablePdf,
    /// PDF that opened but yielded no text (scanned image, no OCR)
    ImageOnlyPdf,
    /// PDF that could not be parsed at all
    CorruptPdf,
    Html,
    /// HTML whose text could only be extracted in degraded form
    HtmlWithErrors,
    /// Anything the pipeline does not read (docx, xlsx, zip, images, ...)
    NonStandardFormat(String),
    /// Classification failed unexpectedly
    ProcessingError,
}

impl fmt::Display for FormatQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatQuality::NotRequested => f.write_str("NotRequested"),
            FormatQuality::Unreachable => f.write_str("Unreachable"),
            FormatQuality::OpenStructuredFormat(ext) => write!(f, "OpenStructuredFormat({})", ext),
            FormatQuality::ReadablePdf => f.write_str("ReadablePdf"),
            FormatQuality::ImageOnlyPdf => f.write_str("ImageOnlyPdf"),
            FormatQuality::CorruptPdf => f.write_str("CorruptPdf"),
            FormatQuality::Html => f.write_str("Html"),
            FormatQuality::HtmlWithErrors => f.write_str("HtmlWithErrors"),
            FormatQuality::NonStandardFormat(ext) => write!(f, "NonStandardFormat({})", ext),
            FormatQuality::ProcessingError => f.write_str("ProcessingError"),
        }
    }
}

impl FromStr for FormatQuality {
    type Err = ParseOutcomeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s {
            "NotRequested" => FormatQuality::NotRequested,
            "Unreachable" => FormatQuality::Unreachable,
            "ReadablePdf" => FormatQuality::ReadablePdf,
            "ImageOnlyPdf" => FormatQuality::ImageOnlyPdf,
            "CorruptPdf" => FormatQuality::CorruptPdf,
            "Html" => FormatQuality::Html,
            "HtmlWithErrors" => FormatQuality::HtmlWithErrors,
            "ProcessingError" => FormatQuality::ProcessingError,
            other => {
                if let Some(ext) = wrapped(other, "OpenStructuredFormat") {
                    FormatQuality::OpenStructuredFormat(ext.to_string())
                } else if let Some(ext) = wrapped(other, "NonStandardFormat") {
                    FormatQuality::NonStandardFormat(ext.to_string())
                } else {
                    return Err(ParseOutcomeError::new("format quality", s));
                }
            }
        };
        Ok(parsed)
    }
}

/// Outcome of the keyword search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "keywords", rename_all = "snake_case")]
pub enum KeywordHits {
    /// Content search was not enabled for this run
    NotRequested,
    /// No text to search: unreachable, unreadable, or not a text-bearing format
    NotApplicable,
    /// The document is an image-only PDF, so searching is impossible
    Unsearchable,
    /// Every configured keyword found in the text, in configured order.
    /// Empty means the text was searched and nothing matched.
    Matches(Vec<String>),
}

impl fmt::Display for KeywordHits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeywordHits::NotRequested => f.write_str("NotRequested"),
            KeywordHits::NotApplicable => f.write_str("NotApplicable"),
            KeywordHits::Unsearchable => f.write_str("Unsearchable"),
            KeywordHits::Matches(words) => {
                let escaped: Vec<String> = words.iter().map(|w| escape_keyword(w)).collect();
                write!(f, "Matches({})", escaped.join("|"))
            }
        }
    }
}

impl FromStr for KeywordHits {
    type Err = ParseOutcomeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NotRequested" => Ok(KeywordHits::NotRequested),
            "NotApplicable" => Ok(KeywordHits::NotApplicable),
            "Unsearchable" => Ok(KeywordHits::Unsearchable),
            other => wrapped(other, "Matches")
                .map(|inner| KeywordHits::Matches(split_keywords(inner)))
                .ok_or_else(|| ParseOutcomeError::new("keyword hits", s)),
        }
    }
}

// Keywords are joined with '|'. A '|' or backslash inside a keyword is
// escaped with a backslash.
fn escape_keyword(word: &str) -> String {
    word.replace('\\', "\\\\").replace('|', "\\|")
}

fn split_keywords(joined: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut chars = joined.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => current.extend(chars.next()),
            '|' => words.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    words.push(current);
    words.retain(|w| !w.is_empty());
    words
}

/// The terminal outcome of one AuditTask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditResult {
    pub sheet_name: String,
    pub cell_reference: String,
    pub url: String,
    /// 0 when no HTTP response was obtained
    pub http_status: u16,
    pub reachability: Reachability,
    pub format_quality: FormatQuality,
    pub keyword_hits: KeywordHits,
}

impl AuditResult {
    /// A result carrying only the liveness outcome. The document stages
    /// fill in their fields afterwards when they run.
    pub fn from_task(task: &AuditTask, http_status: u16, reachability: Reachability) -> Self {
        let format_quality = if !task.options.enable_format_audit {
            FormatQuality::NotRequested
        } else if reachability.is_reachable() {
            FormatQuality::ProcessingError
        } else {
            FormatQuality::Unreachable
        };
        let keyword_hits = if task.options.enable_content_search {
            KeywordHits::NotApplicable
        } else {
            KeywordHits::NotRequested
        };

        AuditResult {
            sheet_name: task.sheet_name.clone(),
            cell_reference: task.cell_reference.clone(),
            url: task.url.clone(),
            http_status,
            reachability,
            format_quality,
            keyword_hits,
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey::new(&self.sheet_name, &self.cell_reference, &self.url)
    }

    pub fn is_ok(&self) -> bool {
        self.reachability.is_reachable()
    }
}

/// A text form from the checkpoint log that does not name a known outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcomeError {
    what: &'static str,
    value: String,
}

impl ParseOutcomeError {
    fn new(what: &'static str, value: &str) -> Self {
        ParseOutcomeError {
            what,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ParseOutcomeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} value '{}'", self.what, self.value)
    }
}

impl std::error::Error for ParseOutcomeError {}

// "Name(inner)" -> Some("inner")
fn wrapped<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    s.strip_prefix(name)?.strip_prefix('(')?.strip_suffix(')')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(options: AuditOptions) -> AuditTask {
        AuditTask {
            sheet_name: "Sheet1".to_string(),
            cell_reference: "A1".to_string(),
            url: "https://example.org".to_string(),
            cell_text: "https://example.org".to_string(),
            keywords: Arc::from(Vec::<String>::new()),
            options,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(Reachability::from_status(200), Reachability::Reachable);
        assert_eq!(Reachability::from_status(404), Reachability::NotFound);
        assert_eq!(Reachability::from_status(403), Reachability::Forbidden);
        assert_eq!(Reachability::from_status(500), Reachability::ServerError(500));
        assert_eq!(Reachability::from_status(204), Reachability::ServerError(204));
    }

    #[test]
    fn test_reachability_text_form() {
        let all = [
            Reachability::Reachable,
            Reachability::ServerError(503),
            Reachability::Timeout,
        ];
        for value in all {
            assert_eq!(value.to_string().parse::<Reachability>(), Ok(value));
        }
        assert!("ServerError(abc)".parse::<Reachability>().is_err());
    }

    #[test]
    fn test_format_quality_text_form() {
        let ext = FormatQuality::NonStandardFormat("docx".to_string());
        assert_eq!("NonStandardFormat(docx)".parse::<FormatQuality>(), Ok(ext));
        assert_eq!(
            "OpenStructuredFormat(csv)".parse::<FormatQuality>(),
            Ok(FormatQuality::OpenStructuredFormat("csv".to_string()))
        );
        assert!("Pdf".parse::<FormatQuality>().is_err());
    }

    #[test]
    fn test_no_matches_differs_from_unsearchable() {
        let none: KeywordHits = "Matches()".parse().unwrap();
        assert_eq!(none, KeywordHits::Matches(vec![]));
        assert_ne!(none, KeywordHits::Unsearchable);

        let some = KeywordHits::Matches(vec!["contrato".into(), "licitación".into()]);
        assert_eq!(some.to_string(), "Matches(contrato|licitación)");
        assert_eq!(some.to_string().parse::<KeywordHits>(), Ok(some));
    }

    #[test]
    fn test_keywords_with_separator_read_back_whole() {
        let hits = KeywordHits::Matches(vec!["a|b".into(), r"c\d".into(), "e".into()]);
        let text = hits.to_string();
        assert_eq!(text, r"Matches(a\|b|c\\d|e)");
        assert_eq!(text.parse::<KeywordHits>(), Ok(hits));
    }

    #[test]
    fn test_result_defaults_follow_options() {
        let liveness = AuditResult::from_task(&task(AuditOptions::default()), 200, Reachability::Reachable);
        assert_eq!(liveness.format_quality, FormatQuality::NotRequested);
        assert_eq!(liveness.keyword_hits, KeywordHits::NotRequested);

        let options = AuditOptions {
            enable_format_audit: true,
            enable_content_search: true,
            stealth_delay: false,
        };
        let broken = AuditResult::from_task(&task(options), 404, Reachability::NotFound);
        assert_eq!(broken.format_quality, FormatQuality::Unreachable);
        assert_eq!(broken.keyword_hits, KeywordHits::NotApplicable);
    }
}

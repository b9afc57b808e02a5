// src/audit/report.rs
// =============================================================================
// Turning results into something people read: CSV rows and summary counts.
//
// - ResultRecord: one CSV row per AuditResult (also the checkpoint format)
// - write_report: UTF-8 CSV export, header first
// - Summary: counts per reachability and per format (the data behind charts)
// =============================================================================

use super::types::{AuditOptions, AuditResult, FormatQuality, KeywordHits, ParseOutcomeError};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Column names of the full result schema, in order.
pub const COLUMNS: [&str; 8] = [
    "Sheet",
    "Cell",
    "URL",
    "Status",
    "HTTP Code",
    "Reachability",
    "Format/Quality",
    "Content Match",
];

/// One result as a flat CSV row. Outcome columns hold the Display form of
/// the enums so they can be parsed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(rename = "Sheet")]
    pub sheet: String,
    #[serde(rename = "Cell")]
    pub cell: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "HTTP Code")]
    pub http_code: u16,
    #[serde(rename = "Reachability")]
    pub reachability: String,
    #[serde(rename = "Format/Quality")]
    pub format_quality: String,
    #[serde(rename = "Content Match")]
    pub content_match: String,
}

impl From<&AuditResult> for ResultRecord {
    fn from(result: &AuditResult) -> Self {
        ResultRecord {
            sheet: result.sheet_name.clone(),
            cell: result.cell_reference.clone(),
            url: result.url.clone(),
            status: result.reachability.status_text(),
            http_code: result.http_status,
            reachability: result.reachability.to_string(),
            format_quality: result.format_quality.to_string(),
            content_match: result.keyword_hits.to_string(),
        }
    }
}

impl TryFrom<ResultRecord> for AuditResult {
    type Error = ParseOutcomeError;

    fn try_from(record: ResultRecord) -> Result<Self, Self::Error> {
        Ok(AuditResult {
            reachability: record.reachability.parse()?,
            format_quality: record.format_quality.parse()?,
            keyword_hits: record.content_match.parse()?,
            sheet_name: record.sheet,
            cell_reference: record.cell,
            url: record.url,
            http_status: record.http_code,
        })
    }
}

/// Human-readable format verdict for the table and the export.
pub fn format_text(format: &FormatQuality) -> String {
    match format {
        FormatQuality::NotRequested => String::new(),
        FormatQuality::Unreachable => "Not downloaded (link not reachable)".to_string(),
        FormatQuality::OpenStructuredFormat(ext) => format!("Open data ({})", ext),
        FormatQuality::ReadablePdf => "Readable PDF".to_string(),
        FormatQuality::ImageOnlyPdf => "Image-only PDF (scanned, no text)".to_string(),
        FormatQuality::CorruptPdf => "Corrupt PDF".to_string(),
        FormatQuality::Html => "HTML".to_string(),
        FormatQuality::HtmlWithErrors => "HTML (with errors)".to_string(),
        FormatQuality::NonStandardFormat(ext) => format!("Non-standard format ({})", ext),
        FormatQuality::ProcessingError => "Processing error".to_string(),
    }
}

/// Human-readable keyword outcome for the table and the export.
pub fn content_match_text(hits: &KeywordHits) -> String {
    match hits {
        KeywordHits::NotRequested => String::new(),
        KeywordHits::NotApplicable => "N/A".to_string(),
        KeywordHits::Unsearchable => "Search impossible (image-only PDF)".to_string(),
        KeywordHits::Matches(words) if words.is_empty() => "No matches".to_string(),
        KeywordHits::Matches(words) => format!("Found: {}", words.join(", ")),
    }
}

/// Writes the results as CSV. The Format/Quality and Content Match columns
/// are only present when the run requested them.
pub fn write_report(path: &Path, results: &[AuditResult], options: &AuditOptions) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create report {}", path.display()))?;
    write_report_to(file, results, options)
        .with_context(|| format!("failed to write report {}", path.display()))
}

pub fn write_report_to<W: Write>(out: W, results: &[AuditResult], options: &AuditOptions) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);

    let mut header: Vec<&str> = COLUMNS[..6].to_vec();
    if options.enable_format_audit {
        header.push(COLUMNS[6]);
    }
    if options.enable_content_search {
        header.push(COLUMNS[7]);
    }
    writer.write_record(&header)?;

    for result in results {
        let mut row = vec![
            result.sheet_name.clone(),
            result.cell_reference.clone(),
            result.url.clone(),
            result.reachability.status_text(),
            result.http_status.to_string(),
            result.reachability.to_string(),
        ];
        if options.enable_format_audit {
            row.push(format_text(&result.format_quality));
        }
        if options.enable_content_search {
            row.push(content_match_text(&result.keyword_hits));
        }
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Counts over a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub reachable: usize,
    pub not_found: usize,
    pub forbidden: usize,
    pub server_errors: usize,
    pub network_failures: usize,
    pub timeouts: usize,
    pub unknown_failures: usize,
    /// Format label -> count (only results with a format verdict)
    pub formats: BTreeMap<String, usize>,
    /// Keyword -> number of documents it was found in
    pub keyword_documents: BTreeMap<String, usize>,
}

impl Summary {
    pub fn from_results(results: &[AuditResult]) -> Self {
        use super::types::Reachability::*;

        let mut summary = Summary {
            total: results.len(),
            ..Summary::default()
        };

        for result in results {
            match result.reachability {
                Reachable => summary.reachable += 1,
                NotFound => summary.not_found += 1,
                Forbidden => summary.forbidden += 1,
                ServerError(_) => summary.server_errors += 1,
                NetworkFailure => summary.network_failures += 1,
                Timeout => summary.timeouts += 1,
                UnknownFailure => summary.unknown_failures += 1,
            }

            if !matches!(result.format_quality, FormatQuality::NotRequested) {
                *summary.formats.entry(format_text(&result.format_quality)).or_default() += 1;
            }
            if let KeywordHits::Matches(words) = &result.keyword_hits {
                for word in words {
                    *summary.keyword_documents.entry(word.clone()).or_default() += 1;
                }
            }
        }

        summary
    }

    /// Links that did not answer 200
    pub fn broken(&self) -> usize {
        self.total - self.reachable
    }
}

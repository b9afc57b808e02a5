// src/workbook/extract.rs
// =============================================================================
// The link extractor: walks every sheet, row and cell of a loaded workbook
// and emits one AuditTask per cell that carries a URL.
//
// A cell carries a URL when:
// 1. it has an embedded hyperlink (the hyperlink target wins), or
// 2. its value is a string starting with http:// or https://
//
// Cells with neither are skipped silently. An empty result means "nothing
// to audit", not an error.
// =============================================================================

use super::model::{Cell, Workbook};
use crate::audit::{AuditOptions, AuditTask};
use std::sync::Arc;

/// Extracts one task per URL-bearing cell, in sheet/row/column order.
pub fn extract_tasks(workbook: &Workbook, keywords: &[String], options: AuditOptions) -> Vec<AuditTask> {
    // Every task shares the same keyword list
    let keywords: Arc<[String]> = Arc::from(normalize_keywords(keywords));
    let mut tasks = Vec::new();

    for sheet in &workbook.sheets {
        for row in &sheet.rows {
            for cell in &row.cells {
                if let Some(url) = cell_url(cell) {
                    tasks.push(AuditTask {
                        sheet_name: sheet.name.clone(),
                        cell_reference: cell.reference.clone(),
                        url,
                        cell_text: cell.display_text(),
                        keywords: Arc::clone(&keywords),
                        options,
                    });
                }
            }
        }
    }

    tracing::debug!("extracted {} link(s) from {} sheet(s)", tasks.len(), workbook.sheets.len());
    tasks
}

/// The URL a cell carries, if any. Embedded hyperlinks take precedence
/// over the displayed text.
pub fn cell_url(cell: &Cell) -> Option<String> {
    if let Some(target) = cell.hyperlink.as_deref().filter(|t| !t.trim().is_empty()) {
        return Some(target.to_string());
    }

    cell.text()
        .filter(|text| is_http_link(text))
        .map(str::to_string)
}

/// Lowercases and trims search terms, dropping empties and repeats while
/// keeping the configured order.
pub fn normalize_keywords(keywords: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for keyword in keywords {
        let keyword = keyword.trim().to_lowercase();
        if !keyword.is_empty() && !out.contains(&keyword) {
            out.push(keyword);
        }
    }
    out
}

fn is_http_link(text: &str) -> bool {
    text.starts_with("http://") || text.starts_with("https://")
}

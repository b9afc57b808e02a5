// src/audit/mod.rs
// =============================================================================
// Everything about running an audit once the links are known.
//
// Submodules:
// - types: tasks, outcomes and results
// - orchestrator: the concurrent runner (workers, batches, stealth delay)
// - checkpoint: append-only progress log used to resume interrupted runs
// - report: CSV export and summary counts
// =============================================================================

mod checkpoint;
mod orchestrator;
mod report;
mod types;

pub use checkpoint::Checkpoint;
pub use orchestrator::{Auditor, Progress, RunConfig};
pub use report::{content_match_text, format_text, write_report, Summary};
pub use types::{AuditOptions, AuditResult, AuditTask, FormatQuality, KeywordHits, Reachability};

// src/workbook/mod.rs
// =============================================================================
// Everything between the .xlsx file on disk and the list of audit tasks.
//
// Submodules:
// - model: in-memory sheets, rows and cells
// - xlsx: decodes an .xlsx package into the model
// - extract: walks the model and emits one AuditTask per linked cell
// =============================================================================

mod extract;
mod model;
mod xlsx;

pub use extract::{extract_tasks, normalize_keywords};
pub use model::{Cell, CellValue, Sheet, Workbook};
pub use xlsx::load_workbook;

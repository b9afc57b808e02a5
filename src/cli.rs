// src/cli.rs
// =============================================================================
// Command-line interface, built with clap's derive API.
//
// Two subcommands:
// - audit: check every link of a workbook (optionally classify + search)
// - links: list the links a workbook contains, without touching the network
// =============================================================================

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "transparency-auditor",
    version = "0.1.0",
    about = "Audits the links of transparency-report spreadsheets",
    long_about = "transparency-auditor reads an Excel workbook, checks that every linked document \
                  is still online and, on request, judges its format and searches it for keywords."
)]
pub struct Cli {
    /// Log debug messages
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check every link of a workbook
    ///
    /// Example: transparency-auditor audit report.xlsx --format-audit --keywords contrato,monto
    Audit(AuditArgs),

    /// List the links found in a workbook (no network access)
    ///
    /// Example: transparency-auditor links report.xlsx --json
    Links {
        /// Path to the .xlsx workbook
        workbook: PathBuf,

        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Path to the .xlsx workbook
    pub workbook: PathBuf,

    /// Comma-separated keywords to search for (implies --content-search)
    #[arg(long, value_delimiter = ',')]
    pub keywords: Vec<String>,

    /// File with one keyword per line (implies --content-search)
    #[arg(long, value_name = "FILE")]
    pub keywords_file: Option<PathBuf>,

    /// Download documents and judge their format and quality
    #[arg(long)]
    pub format_audit: bool,

    /// Download documents and search their text for the keywords
    #[arg(long)]
    pub content_search: bool,

    /// Random pause before each request, with fewer workers
    #[arg(long)]
    pub stealth: bool,

    /// Number of concurrent workers (default depends on the mode)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Process links in batches of this size
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Progress log; an existing log is resumed
    #[arg(long, value_name = "FILE")]
    pub checkpoint: Option<PathBuf>,

    /// Write the results as CSV to this file
    #[arg(long, short, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Per-attempt timeout in seconds (default: 5, or 15 when downloading)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Retries for transient failures
    #[arg(long)]
    pub retries: Option<u32>,

    /// PDF pages read for the text-layer check and the search
    #[arg(long, value_name = "N")]
    pub max_pdf_pages: Option<usize>,
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why `global = true` on --verbose and --log-file?
//    - They can then be given before or after the subcommand name
//
// 2. Why Option<...> for the tuning flags?
//    - None means "use the default for this mode"; the defaults differ
//      between a HEAD-only run and a download run, so clap can't know them
//
// 3. value_delimiter = ','
//    - `--keywords a,b --keywords c` gives ["a", "b", "c"]
// -----------------------------------------------------------------------------

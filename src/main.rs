// src/main.rs
// =============================================================================
// Entry point of the transparency-auditor CLI.
//
// What happens here:
// 1. Parse command-line arguments using clap and set up logging
// 2. Load the workbook and extract one audit task per linked cell
// 3. Run the audit (resuming from a checkpoint when one is given)
// 4. Print the results, write the CSV report, pick the exit code
//    (0 = every link reachable, 1 = broken links, 2 = error)
// =============================================================================

mod audit;
mod checker;
mod cli;
mod logging;
mod workbook;

use anyhow::{Context, Result};
use audit::{AuditOptions, AuditResult, AuditTask, Auditor, Checkpoint, Progress, RunConfig, Summary};
use clap::Parser;
use cli::{AuditArgs, Cli, Commands};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            // {:#} prints the whole context chain on one line
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Audit(args) => handle_audit(args).await,
        Commands::Links { workbook, json } => handle_links(&workbook, json),
    }
}

// Handles the 'audit' subcommand
async fn handle_audit(args: AuditArgs) -> Result<i32> {
    let mut keywords = args.keywords.clone();
    if let Some(path) = &args.keywords_file {
        keywords.extend(read_keywords(path)?);
    }
    let keywords = workbook::normalize_keywords(&keywords);

    let options = AuditOptions {
        enable_format_audit: args.format_audit,
        enable_content_search: args.content_search || !keywords.is_empty(),
        stealth_delay: args.stealth,
    };
    if options.enable_content_search && keywords.is_empty() {
        tracing::warn!("content search is on but no keywords were given");
    }

    println!("🔍 Auditing workbook: {}", args.workbook.display());
    let book = workbook::load_workbook(&args.workbook)?;
    let tasks = workbook::extract_tasks(&book, &keywords, options);

    if tasks.is_empty() {
        println!("✅ No links found to check");
        return Ok(0);
    }
    println!("📄 Found {} link(s) in {} sheet(s)", tasks.len(), book.sheets.len());

    let config = run_config(&args, &options);
    let mut checkpoint = match &args.checkpoint {
        Some(path) => Some(Checkpoint::open(path)?),
        None => None,
    };
    let previous: Vec<AuditResult> = checkpoint
        .as_ref()
        .map(|log| log.previous().to_vec())
        .unwrap_or_default();

    println!("\n🌐 Checking with {} worker(s)...\n", config.workers.max(1));
    let auditor = Auditor::new(config);
    let run = auditor
        .run(tasks.clone(), checkpoint.as_mut(), print_progress)
        .await;
    eprintln!();

    let results = merge_results(&tasks, previous, run.results);
    let summary = Summary::from_results(&results);

    if args.json {
        let output = serde_json::json!({
            "options": options,
            "summary": summary,
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_table(&results, &options);
        print_summary(&summary, run.resumed);
    }

    if let Some(path) = &args.output {
        audit::write_report(path, &results, &options)?;
        println!("💾 Report written to {}", path.display());
    }

    if results.iter().all(AuditResult::is_ok) {
        Ok(0)
    } else {
        Ok(1)
    }
}

// Handles the 'links' subcommand
fn handle_links(path: &Path, json: bool) -> Result<i32> {
    let book = workbook::load_workbook(path)?;
    let tasks = workbook::extract_tasks(&book, &[], AuditOptions::default());

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(0);
    }

    println!("{:<20} {:<8} {:<60}", "SHEET", "CELL", "URL");
    println!("{}", "=".repeat(90));
    for task in &tasks {
        println!(
            "{:<20} {:<8} {:<60}",
            shorten(&task.sheet_name, 20),
            task.cell_reference,
            task.url
        );
    }
    println!("\n📋 Total: {}", tasks.len());
    Ok(0)
}

fn read_keywords(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read keywords file {}", path.display()))?;
    Ok(text.lines().map(str::to_string).collect())
}

// Mode defaults, then whatever the user overrode
fn run_config(args: &AuditArgs, options: &AuditOptions) -> RunConfig {
    let mut config = RunConfig::for_options(options);
    if let Some(workers) = args.workers {
        config.workers = workers.max(1);
    }
    config.batch_size = args.batch_size;
    if let Some(secs) = args.timeout {
        config.http.timeout = Duration::from_secs(secs.max(1));
    }
    if let Some(retries) = args.retries {
        config.http.max_retries = retries;
    }
    if let Some(pages) = args.max_pdf_pages {
        config.classifier.max_pdf_pages = pages.max(1);
    }
    config
}

fn print_progress(progress: Progress) {
    let mut stderr = std::io::stderr();
    // Progress output is best effort
    let _ = write!(
        stderr,
        "\r⏳ {:>3}% ({}/{})",
        progress.percent(),
        progress.completed,
        progress.total
    );
    let _ = stderr.flush();
}

// Results from the checkpoint plus this run's, in workbook order. Records
// for tasks the workbook no longer has are dropped.
fn merge_results(tasks: &[AuditTask], previous: Vec<AuditResult>, fresh: Vec<AuditResult>) -> Vec<AuditResult> {
    let order: HashMap<_, _> = tasks.iter().enumerate().map(|(i, t)| (t.key(), i)).collect();

    let mut results: Vec<(usize, AuditResult)> = previous
        .into_iter()
        .chain(fresh)
        .filter_map(|r| order.get(&r.key()).map(|i| (*i, r)))
        .collect();
    results.sort_by_key(|(i, _)| *i);
    results.dedup_by_key(|(i, _)| *i);
    results.into_iter().map(|(_, r)| r).collect()
}

fn print_table(results: &[AuditResult], options: &AuditOptions) {
    println!("{:<12} {:<7} {:<50} {:<18} {:<30}", "SHEET", "CELL", "URL", "STATUS", "DETAILS");
    println!("{}", "=".repeat(120));

    for result in results {
        let mut details = Vec::new();
        if options.enable_format_audit {
            details.push(audit::format_text(&result.format_quality));
        }
        if options.enable_content_search {
            details.push(audit::content_match_text(&result.keyword_hits));
        }
        details.retain(|d| !d.is_empty());

        println!(
            "{:<12} {:<7} {:<50} {:<18} {:<30}",
            shorten(&result.sheet_name, 12),
            result.cell_reference,
            shorten(&result.url, 50),
            format_status(result),
            details.join(" | ")
        );
    }
    println!();
}

fn print_summary(summary: &Summary, resumed: usize) {
    println!("📊 Summary:");
    println!("   ✅ Active: {}", summary.reachable);
    println!("   ❌ Broken: {}", summary.broken());
    if summary.broken() > 0 {
        println!(
            "      404: {}  403: {}  server errors: {}  connection: {}  timeouts: {}  other: {}",
            summary.not_found,
            summary.forbidden,
            summary.server_errors,
            summary.network_failures,
            summary.timeouts,
            summary.unknown_failures
        );
    }
    for (format, count) in &summary.formats {
        println!("   📁 {}: {}", format, count);
    }
    for (keyword, count) in &summary.keyword_documents {
        println!("   🔎 \"{}\" found in {} document(s)", keyword, count);
    }
    if resumed > 0 {
        println!("   ♻️  Resumed from checkpoint: {}", resumed);
    }
    println!("   📋 Total: {}", summary.total);
}

fn format_status(result: &AuditResult) -> String {
    let icon = match result.reachability {
        audit::Reachability::Reachable => "✅",
        audit::Reachability::Timeout => "⏱️ ",
        audit::Reachability::NetworkFailure => "🌐",
        _ => "❌",
    };
    format!("{} {}", icon, result.reachability.status_text())
}

// Cuts a string to `max` characters for the table, on a char boundary
fn shorten(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

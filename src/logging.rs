// src/logging.rs
// Tracing setup. Logs go to stderr so stdout stays clean for --json output.

use anyhow::Result;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging system. A set RUST_LOG replaces the defaults
/// entirely; `--verbose` still raises this crate to debug.
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let env_filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), verbose)?;

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    if let Some(log_file) = log_file {
        if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(log_file)?;
        let file_layer = fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(Mutex::new(file));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }

    Ok(())
}

// Filter from a RUST_LOG value, or the defaults (crate at info, the rest
// at warn) when there is none.
fn build_filter(rust_log: Option<&str>, verbose: bool) -> Result<EnvFilter> {
    let filter = match rust_log.filter(|v| !v.trim().is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::new("warn,transparency_auditor=info"),
    };
    Ok(if verbose {
        filter.add_directive("transparency_auditor=debug".parse()?)
    } else {
        filter
    })
}

// src/audit/checkpoint.rs
// =============================================================================
// Durable, append-only progress log for long audits.
//
// Format: CSV with the full result header, one data row per finished task.
// - Every result is written with a single write_all + sync_data, so a killed
//   process leaves at most one torn line at the end of the file.
// - open() cuts a torn trailing line off before reading, so the file is
//   always a header plus whole records.
// - A file that does not start with the header is refused and left as it is.
// - On resume, tasks whose (sheet, cell, url) is already in the log are
//   skipped, so no task is ever recorded twice.
// =============================================================================

use super::report::{ResultRecord, COLUMNS};
use super::types::{AuditResult, AuditTask, TaskKey};
use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// An open checkpoint log.
#[derive(Debug)]
pub struct Checkpoint {
    path: PathBuf,
    file: File,
    /// Results recorded by earlier runs, in file order
    previous: Vec<AuditResult>,
    recorded: HashSet<TaskKey>,
    /// Rows appended by this process
    appended: usize,
}

impl Checkpoint {
    /// Opens (or creates) the log at `path` and loads what it already holds.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .with_context(|| format!("failed to open checkpoint {}", path.display()))?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .with_context(|| format!("failed to read checkpoint {}", path.display()))?;

        // Nothing is modified until the file is known to be ours
        let header = header_line()?;
        let torn_header = !bytes.is_empty() && bytes.len() < header.len() && header.starts_with(&bytes);
        if !bytes.is_empty() && !torn_header && !bytes.starts_with(&header) {
            bail!(
                "{} is not a checkpoint log (expected header {:?})",
                path.display(),
                String::from_utf8_lossy(&header).trim_end()
            );
        }

        // Drop a torn last line left by an interrupted write
        let complete = if torn_header {
            0
        } else {
            bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1)
        };
        if complete < bytes.len() {
            tracing::warn!(
                "checkpoint {} ends with a partial record ({} bytes), discarding it",
                path.display(),
                bytes.len() - complete
            );
            file.set_len(complete as u64)?;
            bytes.truncate(complete);
        }

        if bytes.is_empty() {
            file.write_all(&header)?;
            file.sync_data()?;
        }

        let previous = parse_log(&bytes).with_context(|| format!("invalid checkpoint {}", path.display()))?;
        let recorded = previous.iter().map(AuditResult::key).collect();

        if !previous.is_empty() {
            tracing::info!("checkpoint {} holds {} result(s)", path.display(), previous.len());
        }

        Ok(Checkpoint {
            path: path.to_path_buf(),
            file,
            previous,
            recorded,
            appended: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Results that were already in the log when it was opened.
    pub fn previous(&self) -> &[AuditResult] {
        &self.previous
    }

    /// Number of data rows in the log, including this run's appends.
    pub fn len(&self) -> usize {
        self.previous.len() + self.appended
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when a result for this task is already in the log.
    pub fn contains(&self, task: &AuditTask) -> bool {
        self.recorded.contains(&task.key())
    }

    /// Appends one result and flushes it to disk before returning.
    pub fn append(&mut self, result: &AuditResult) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.serialize(ResultRecord::from(result))?;
        let line = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("failed to encode checkpoint record: {}", e.error()))?;

        // One write per record: a crash can only tear the last line
        self.file.write_all(&line)?;
        self.file.sync_data()?;

        self.recorded.insert(result.key());
        self.appended += 1;
        Ok(())
    }
}

fn header_line() -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(COLUMNS)?;
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to encode checkpoint header: {}", e.error()))
}

fn parse_log(bytes: &[u8]) -> Result<Vec<AuditResult>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_reader(bytes);
    let headers = reader.headers()?.clone();
    if !headers.iter().eq(COLUMNS.iter().copied()) {
        bail!("unexpected header: {:?}", headers);
    }

    let mut results = Vec::new();
    for (i, row) in reader.deserialize::<ResultRecord>().enumerate() {
        // +2: one for the header, one for 1-based line numbers
        let record = row.with_context(|| format!("bad record on line {}", i + 2))?;
        let result = AuditResult::try_from(record).with_context(|| format!("bad record on line {}", i + 2))?;
        results.push(result);
    }
    Ok(results)
}

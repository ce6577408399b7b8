// src/log_store.rs

//! Append-only JSONL store backing the run log.
//!
//! The file is the durable source of truth for run reconstruction. Writes are
//! best-effort telemetry: a failed append must never abort the command
//! execution that triggered it, so `append` swallows errors after logging
//! them. Reads tolerate a truncated final line from a crashed writer.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::events::LogEntry;
use crate::paths::LogPaths;
use crate::util::ensure_dir;

/// Append one event as a single JSON line, creating directories on first use.
///
/// Errors are logged and swallowed; logging is not a correctness dependency.
pub fn append(paths: &LogPaths, entry: &LogEntry) {
    if let Err(e) = try_append(paths, entry) {
        tracing::warn!(error = %e, run_id = %entry.run_id, "failed to append event log line");
    }
}

fn try_append(paths: &LogPaths, entry: &LogEntry) -> Result<()> {
    paths.ensure()?;

    let mut line = serde_json::to_string(entry).context("Failed to serialize log entry")?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.jsonl_log)
        .with_context(|| format!("Failed to open event log {:?}", paths.jsonl_log))?;

    file.write_all(line.as_bytes())
        .context("Failed to write event log line")?;
    Ok(())
}

/// Read every parseable event, in file order.
///
/// A missing or unreadable file yields an empty vec. Lines that fail to parse
/// (typically a partial write from a crashed process) are skipped without
/// affecting the lines around them.
pub fn read_all(paths: &LogPaths) -> Vec<LogEntry> {
    let raw = match std::fs::read_to_string(&paths.jsonl_log) {
        Ok(raw) => raw,
        Err(_) => return Vec::new(),
    };

    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<LogEntry>(line).ok())
        .collect()
}

/// Replace the event log with exactly `entries`, atomically.
///
/// Used only by clear-history. Writes to a temp file in the same directory and
/// renames it over the log so readers never observe a half-written file.
pub fn rewrite(paths: &LogPaths, entries: &[LogEntry]) -> Result<()> {
    paths.ensure()?;

    let dir = paths
        .jsonl_log
        .parent()
        .context("Event log path has no parent directory")?;
    ensure_dir(dir)?;

    let mut tmp = NamedTempFile::new_in(dir).context("Failed to create temp log file")?;
    for entry in entries {
        let line = serde_json::to_string(entry).context("Failed to serialize log entry")?;
        writeln!(tmp, "{line}").context("Failed to write temp log file")?;
    }
    tmp.flush().context("Failed to flush temp log file")?;

    tmp.persist(&paths.jsonl_log)
        .with_context(|| format!("Failed to replace event log {:?}", paths.jsonl_log))?;
    Ok(())
}

/// Truncate an auxiliary file (index, error log) to empty if it exists.
pub fn truncate_if_exists(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::write(path, "") {
            tracing::warn!(error = %e, path = %path.display(), "failed to truncate auxiliary log");
        }
    }
}

// src/paths.rs

//! On-disk layout of the run-tracking state.
//!
//! Everything lives under a single base directory (default
//! `~/.autoweave/logs`) so that tests can point the whole subsystem at a
//! temporary directory:
//!
//! - `agent-executor.jsonl`  append-only event log (source of truth)
//! - `runs/<run_id>.log`     per-run transcripts (display only)
//! - `errors.log`            human-readable failure blocks
//! - `index.txt`             newest-first one-line run summaries

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::util::ensure_dir;

#[derive(Debug, Clone)]
pub struct LogPaths {
    pub log_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub jsonl_log: PathBuf,
    pub error_log: PathBuf,
    pub index_file: PathBuf,
}

impl LogPaths {
    pub fn new(base: &Path) -> Self {
        Self {
            log_dir: base.to_path_buf(),
            runs_dir: base.join("runs"),
            jsonl_log: base.join("agent-executor.jsonl"),
            error_log: base.join("errors.log"),
            index_file: base.join("index.txt"),
        }
    }

    /// Default location under the user's home directory.
    pub fn default_base() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".autoweave")
            .join("logs")
    }

    /// Create the directory tree on first use.
    pub fn ensure(&self) -> Result<()> {
        ensure_dir(&self.log_dir)?;
        ensure_dir(&self.runs_dir)?;
        Ok(())
    }

    /// Transcript path for a run id.
    pub fn transcript(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(format!("{run_id}.log"))
    }
}

// src/transcript.rs

//! Per-run transcript files.
//!
//! One free-text file per run id under `runs/`, written incrementally while a
//! run is active and finalized with a footer when it ends. Transcripts are a
//! human-readable artifact only: consumers must never parse them for status,
//! the JSONL event log is authoritative.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::events::{format_local_time, now_local};
use crate::paths::LogPaths;

pub struct TranscriptWriter {
    path: PathBuf,
    file: Option<File>,
    header_written: bool,
    run_id: String,
    start_time: NaiveDateTime,
    target: String,
    work_dir: String,
    pid: Option<u32>,
}

impl TranscriptWriter {
    pub fn new(
        paths: &LogPaths,
        run_id: &str,
        start_time: NaiveDateTime,
        target: &str,
        work_dir: &str,
    ) -> Self {
        Self {
            path: paths.transcript(run_id),
            file: None,
            header_written: false,
            run_id: run_id.to_string(),
            start_time,
            target: target.to_string(),
            work_dir: work_dir.to_string(),
            pid: None,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Record the pid once the spawn has surfaced it. The header is deferred
    /// until first write so it can include the pid when available.
    pub fn set_pid(&mut self, pid: Option<u32>) {
        self.pid = pid;
    }

    fn open(&mut self) -> Result<&mut File> {
        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create runs directory {:?}", parent))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("Failed to open transcript {:?}", self.path))?;
            self.file = Some(file);
        }
        Ok(self.file.as_mut().expect("file opened above"))
    }

    fn header(&self) -> String {
        let pid_line = match self.pid {
            Some(pid) => format!("PID: {pid}"),
            None => "PID: pending".to_string(),
        };
        format!(
            "========================================\n\
             autoweave run transcript\n\
             ========================================\n\
             Run ID: {}\n\
             Started: {}\n\
             {}\n\
             Target: {}\n\
             Work dir: {}\n\
             ----------------------------------------\n\
             Output:\n\
             ========================================\n",
            self.run_id,
            format_local_time(self.start_time),
            pid_line,
            self.target,
            self.work_dir,
        )
    }

    /// Append a chunk of raw process output, writing the header first if this
    /// is the first write.
    pub fn append(&mut self, chunk: &str) -> Result<()> {
        if !self.header_written {
            let header = self.header();
            self.open()?.write_all(header.as_bytes())?;
            self.header_written = true;
        }
        self.open()?.write_all(chunk.as_bytes())?;
        Ok(())
    }

    /// Write the remaining output (if none was streamed) and the footer, then
    /// close the file.
    pub fn finalize(&mut self, output: &str, exit_code: i32, duration_secs: f64) -> Result<()> {
        let streamed = self.header_written;
        if !streamed {
            let header = self.header();
            self.open()?.write_all(header.as_bytes())?;
            self.header_written = true;
            self.open()?.write_all(output.as_bytes())?;
        }

        let footer = format!(
            "\n========================================\n\n\
             Finished: {}\n\
             Duration: {duration_secs}s\n\
             Exit code: {exit_code}\n",
            format_local_time(now_local()),
        );
        self.open()?.write_all(footer.as_bytes())?;
        self.file = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::parse_local_time;
    use tempfile::tempdir;

    fn start() -> NaiveDateTime {
        parse_local_time("2026-08-23 10:00:00").unwrap()
    }

    #[test]
    fn finalize_writes_header_body_footer() {
        let dir = tempdir().unwrap();
        let lp = LogPaths::new(dir.path());
        let mut w = TranscriptWriter::new(&lp, "run_t1", start(), "/x/report.pdf", "/w");
        w.set_pid(Some(4321));
        w.finalize("all output here", 0, 12.5).unwrap();

        let text = std::fs::read_to_string(lp.transcript("run_t1")).unwrap();
        assert!(text.contains("Run ID: run_t1"));
        assert!(text.contains("Started: 2026-08-23 10:00:00"));
        assert!(text.contains("PID: 4321"));
        assert!(text.contains("Target: /x/report.pdf"));
        assert!(text.contains("all output here"));
        assert!(text.contains("Duration: 12.5s"));
        assert!(text.contains("Exit code: 0"));
    }

    #[test]
    fn streamed_chunks_are_not_duplicated_by_finalize() {
        let dir = tempdir().unwrap();
        let lp = LogPaths::new(dir.path());
        let mut w = TranscriptWriter::new(&lp, "run_t2", start(), "task", "/w");
        w.append("chunk one\n").unwrap();
        w.append("chunk two\n").unwrap();
        w.finalize("chunk one\nchunk two\n", 1, 3.0).unwrap();

        let text = std::fs::read_to_string(lp.transcript("run_t2")).unwrap();
        assert_eq!(text.matches("chunk one").count(), 1);
        assert!(text.contains("PID: pending"));
        assert!(text.contains("Exit code: 1"));
    }
}

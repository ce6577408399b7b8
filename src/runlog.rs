// src/runlog.rs

//! Lifecycle event emission for a single run.
//!
//! `RunLogger` is the single writer for its run id: it appends the causal
//! `started` -> `executing` -> terminal sequence to the event log, maintains
//! the transcript, and updates the index and error side files. Every write is
//! fire-and-forget; a logging failure never propagates into the execution
//! result.

use std::time::Instant;

use crate::events::{self, format_local_time, now_local, now_local_string};
use crate::log_store;
use crate::paths::LogPaths;
use crate::run_id::RunId;
use crate::transcript::TranscriptWriter;
use crate::util::file_name_of;

pub struct RunLogger {
    paths: LogPaths,
    run_id: RunId,
    target: String,
    work_dir: String,
    prompt: String,
    pid: Option<u32>,
    start: Instant,
    transcript: TranscriptWriter,
}

impl RunLogger {
    /// Create the logger and append the `started` event. `started` is always
    /// the first event of a run and carries the target and work dir.
    pub fn new(paths: &LogPaths, target: &str, work_dir: &str) -> Self {
        let run_id = RunId::new();
        let start_wall = now_local();
        let transcript = TranscriptWriter::new(paths, run_id.as_str(), start_wall, target, work_dir);

        log_store::append(paths, &events::started(&run_id, target, work_dir));

        Self {
            paths: paths.clone(),
            run_id,
            target: target.to_string(),
            work_dir: work_dir.to_string(),
            prompt: String::new(),
            pid: None,
            start: Instant::now(),
            transcript,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn log_path(&self) -> std::path::PathBuf {
        self.transcript.path().clone()
    }

    pub fn log_validated(&self) {
        log_store::append(
            &self.paths,
            &events::validated(&self.run_id, &self.target, &self.work_dir),
        );
    }

    /// Append `executing` as soon as the pid is known. The pid is discovered
    /// asynchronously after spawn, so a run with only a `started` event is
    /// "running, pid pending" and callers must tolerate it.
    pub fn log_executing(&mut self, prompt: &str, pid: Option<u32>) {
        self.prompt = prompt.to_string();
        self.pid = pid;
        self.transcript.set_pid(pid);
        log_store::append(&self.paths, &events::executing(&self.run_id, prompt, pid));
    }

    /// Stream one chunk of live process output: append it to the transcript
    /// and mirror it into the event log as `realtime_output`.
    pub fn log_output_chunk(&mut self, chunk: &str) {
        if let Err(e) = self.transcript.append(chunk) {
            tracing::warn!(error = %e, run_id = %self.run_id, "failed to stream transcript chunk");
        }
        log_store::append(&self.paths, &events::realtime_output(&self.run_id, chunk));
    }

    /// Append the terminal event and finalize the side artifacts.
    ///
    /// Exit code 0 is `completed`; anything else (including the synthetic -1
    /// for timeouts and forced cancellation) is `failed`.
    pub fn log_completed(&mut self, output: &str, exit_code: i32) {
        let duration_secs = self.start.elapsed().as_millis() as f64 / 1000.0;
        let cmd = if self.prompt.is_empty() {
            "unknown".to_string()
        } else {
            self.prompt.replace('"', "'")
        };

        if let Err(e) = self.transcript.finalize(output, exit_code, duration_secs) {
            tracing::warn!(error = %e, run_id = %self.run_id, "failed to finalize transcript");
        }

        if exit_code == 0 {
            log_store::append(
                &self.paths,
                &events::completed(
                    &self.run_id,
                    duration_secs,
                    self.pid,
                    &self.target,
                    &self.work_dir,
                    &cmd,
                    output,
                ),
            );
            self.update_index("SUCCESS", duration_secs);
        } else {
            log_store::append(
                &self.paths,
                &events::failed(
                    &self.run_id,
                    duration_secs,
                    exit_code,
                    self.pid,
                    &self.target,
                    &self.work_dir,
                    &cmd,
                    output,
                    "execution_error",
                ),
            );
            self.write_error_block(output, exit_code);
            self.update_index("FAILED", duration_secs);
        }
    }

    fn write_error_block(&self, message: &str, exit_code: i32) {
        let block = format!(
            "========================================\n\
             [{}] error record\n\
             ========================================\n\
             Run ID: {}\n\
             Target: {}\n\
             Work dir: {}\n\
             Exit code: {exit_code}\n\
             ----------------------------------------\n\
             {message}\n\
             ========================================\n\n",
            now_local_string(),
            self.run_id,
            self.target,
            self.work_dir,
        );

        if let Err(e) = append_to(&self.paths.error_log, &block) {
            tracing::warn!(error = %e, "failed to write error log block");
        }
    }

    /// Prepend a one-line summary to the index file, newest first.
    fn update_index(&self, label: &str, duration_secs: f64) {
        let entry = format!(
            "[{}] [{label}] {} - {} ({}s)\n  -> {}\n",
            format_local_time(now_local()),
            self.run_id,
            file_name_of(&self.target),
            duration_secs.round(),
            self.transcript.path().display(),
        );

        let existing = std::fs::read_to_string(&self.paths.index_file).unwrap_or_default();
        if let Err(e) = std::fs::write(&self.paths.index_file, format!("{entry}{existing}")) {
            tracing::warn!(error = %e, "failed to update index file");
        }
    }
}

fn append_to(path: &std::path::Path, text: &str) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use tempfile::tempdir;

    #[test]
    fn lifecycle_emits_causal_event_sequence() {
        let dir = tempdir().unwrap();
        let lp = LogPaths::new(dir.path());

        let mut logger = RunLogger::new(&lp, "/x/report.pdf", "/w");
        logger.log_validated();
        logger.log_executing("/review \"/x/report.pdf\"", Some(4321));
        logger.log_completed("done", 0);

        let entries = log_store::read_all(&lp);
        let kinds: Vec<EventKind> = entries.iter().map(|e| e.event).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Started,
                EventKind::Validated,
                EventKind::Executing,
                EventKind::Completed
            ]
        );
        assert!(entries.iter().all(|e| e.run_id == logger.run_id().as_str()));

        let executing = &entries[2];
        assert_eq!(executing.pid, Some(4321));
        assert_eq!(executing.cmd.as_deref(), Some("/review '/x/report.pdf'"));

        let done = &entries[3];
        assert_eq!(done.duration_unit.as_deref(), Some("s"));
        assert_eq!(done.output.as_deref(), Some("done"));
        assert!(lp.transcript(logger.run_id().as_str()).exists());
    }

    #[test]
    fn failure_writes_error_block_and_index_line() {
        let dir = tempdir().unwrap();
        let lp = LogPaths::new(dir.path());

        let mut logger = RunLogger::new(&lp, "/x/report.pdf", "/w");
        logger.log_executing("/review", Some(7));
        logger.log_completed("something broke", 2);

        let entries = log_store::read_all(&lp);
        let last = entries.last().unwrap();
        assert_eq!(last.event, EventKind::Failed);
        assert_eq!(last.exit_code, Some(2));
        assert_eq!(last.reason.as_deref(), Some("execution_error"));

        let errors = std::fs::read_to_string(&lp.error_log).unwrap();
        assert!(errors.contains("something broke"));
        assert!(errors.contains("Exit code: 2"));

        let index = std::fs::read_to_string(&lp.index_file).unwrap();
        assert!(index.contains("[FAILED]"));
        assert!(index.contains("report.pdf"));
    }

    #[test]
    fn index_lines_are_prepended_newest_first() {
        let dir = tempdir().unwrap();
        let lp = LogPaths::new(dir.path());

        let mut first = RunLogger::new(&lp, "/x/a.pdf", "/w");
        first.log_executing("/a", None);
        first.log_completed("ok", 0);

        let mut second = RunLogger::new(&lp, "/x/b.pdf", "/w");
        second.log_executing("/b", None);
        second.log_completed("ok", 0);

        let index = std::fs::read_to_string(&lp.index_file).unwrap();
        let a_pos = index.find("a.pdf").unwrap();
        let b_pos = index.find("b.pdf").unwrap();
        assert!(b_pos < a_pos);
    }
}

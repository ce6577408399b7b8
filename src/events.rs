//! Event records for the append-only run log.
//!
//! One record is serialized per line of `agent-executor.jsonl`. Records are
//! immutable once written; the only mutation the file ever sees is the
//! clear-history rewrite in `status.rs`.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::run_id::RunId;
use crate::util::truncate_chars;

/// Captured output stored on terminal events is truncated to keep the JSONL
/// file bounded. The transcript file holds the full text.
pub const OUTPUT_LIMIT_CHARS: usize = 10_000;

/// Wall-clock timestamps use this fixed local-time format, second precision.
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Executing,
    Completed,
    Failed,
    Validated,
    RealtimeOutput,
}

impl EventKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, EventKind::Completed | EventKind::Failed)
    }
}

/// One line of the JSONL event log.
///
/// `status` mirrors the event kind (`running|success|error`) and is not
/// independently authoritative. Optional fields depend on the event kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts: String,
    pub event: EventKind,
    pub status: String,
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Seconds for all new writers; legacy producers recorded milliseconds.
    /// Consumers go through [`normalized_duration_secs`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Explicit unit emitted by new writers ("s") so the legacy magnitude
    /// heuristic is only needed for old lines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl LogEntry {
    fn base(event: EventKind, status: &str, run_id: &RunId) -> Self {
        Self {
            ts: now_local_string(),
            event,
            status: status.to_string(),
            run_id: run_id.as_str().to_string(),
            target: None,
            work_dir: None,
            cmd: None,
            pid: None,
            duration: None,
            duration_unit: None,
            exit_code: None,
            output: None,
            reason: None,
        }
    }

    /// Duration in seconds regardless of the unit the producer used.
    pub fn duration_secs(&self) -> Option<f64> {
        match (self.duration, self.duration_unit.as_deref()) {
            (Some(d), Some("s")) => Some(d),
            (Some(d), _) => Some(normalized_duration_secs(d)),
            (None, _) => None,
        }
    }

    /// Parse the record timestamp as local wall-clock time.
    pub fn parsed_ts(&self) -> Option<NaiveDateTime> {
        parse_local_time(&self.ts)
    }
}

/* ---------------- builders ---------------- */

pub fn started(run_id: &RunId, target: &str, work_dir: &str) -> LogEntry {
    let mut e = LogEntry::base(EventKind::Started, "running", run_id);
    e.target = Some(target.to_string());
    e.work_dir = Some(work_dir.to_string());
    e
}

pub fn validated(run_id: &RunId, target: &str, work_dir: &str) -> LogEntry {
    let mut e = LogEntry::base(EventKind::Validated, "success", run_id);
    e.target = Some(target.to_string());
    e.work_dir = Some(work_dir.to_string());
    e
}

pub fn executing(run_id: &RunId, cmd: &str, pid: Option<u32>) -> LogEntry {
    let mut e = LogEntry::base(EventKind::Executing, "running", run_id);
    // Double quotes in the invocation would fight with the JSON line format
    // in naive consumers; normalize them like the original producer did.
    e.cmd = Some(cmd.replace('"', "'"));
    e.pid = pid;
    e
}

#[allow(clippy::too_many_arguments)]
pub fn completed(
    run_id: &RunId,
    duration_secs: f64,
    pid: Option<u32>,
    target: &str,
    work_dir: &str,
    cmd: &str,
    output: &str,
) -> LogEntry {
    let mut e = LogEntry::base(EventKind::Completed, "success", run_id);
    e.duration = Some(duration_secs);
    e.duration_unit = Some("s".to_string());
    e.pid = pid;
    e.target = Some(target.to_string());
    e.work_dir = Some(work_dir.to_string());
    e.cmd = Some(cmd.to_string());
    e.output = Some(truncate_chars(output, OUTPUT_LIMIT_CHARS));
    e
}

#[allow(clippy::too_many_arguments)]
pub fn failed(
    run_id: &RunId,
    duration_secs: f64,
    exit_code: i32,
    pid: Option<u32>,
    target: &str,
    work_dir: &str,
    cmd: &str,
    output: &str,
    reason: &str,
) -> LogEntry {
    let mut e = LogEntry::base(EventKind::Failed, "error", run_id);
    e.duration = Some(duration_secs);
    e.duration_unit = Some("s".to_string());
    e.exit_code = Some(exit_code);
    e.pid = pid;
    e.target = Some(target.to_string());
    e.work_dir = Some(work_dir.to_string());
    e.cmd = Some(cmd.to_string());
    e.output = Some(truncate_chars(output, OUTPUT_LIMIT_CHARS));
    e.reason = Some(reason.to_string());
    e
}

/// One chunk of live output, mirrored into the log while the run is active.
/// Non-terminal; reconstruction ignores it.
pub fn realtime_output(run_id: &RunId, chunk: &str) -> LogEntry {
    let mut e = LogEntry::base(EventKind::RealtimeOutput, "running", run_id);
    e.output = Some(truncate_chars(chunk, OUTPUT_LIMIT_CHARS));
    e
}

/// Synthetic failure appended by the operator to unstick a view. Independent
/// of actual process state; never retracts earlier events.
pub fn force_failed(run_id: &str, duration_secs: f64) -> LogEntry {
    LogEntry {
        ts: now_local_string(),
        event: EventKind::Failed,
        status: "error".to_string(),
        run_id: run_id.to_string(),
        target: None,
        work_dir: None,
        cmd: None,
        pid: None,
        duration: Some(duration_secs),
        duration_unit: Some("s".to_string()),
        exit_code: Some(-1),
        output: None,
        reason: Some("user_force_closed".to_string()),
    }
}

/* ---------------- time helpers ---------------- */

pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

pub fn now_local_string() -> String {
    format_local_time(now_local())
}

pub fn format_local_time(t: NaiveDateTime) -> String {
    t.format(TS_FORMAT).to_string()
}

pub fn parse_local_time(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT).ok()
}

/// Legacy producers wrote `duration` in milliseconds. Anything above 1000 is
/// treated as milliseconds and converted; preserved for read-compatibility.
pub fn normalized_duration_secs(value: f64) -> f64 {
    if value > 1000.0 {
        value / 1000.0
    } else {
        value
    }
}

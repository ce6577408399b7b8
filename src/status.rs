// src/status.rs

//! Run reconstruction and the query layer over the event log.
//!
//! Every query rebuilds `RunInfo` fresh from the log; nothing here is
//! persisted. The core correctness invariant: an explicit terminal event in
//! the log always wins over live process inspection. The prober is consulted
//! only when the log is silent (no terminal event yet), and its verdict is
//! marked with a sentinel exit code so callers can tell detected failures
//! from log-confirmed ones.

use anyhow::Result;
use chrono::{Duration, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::events::{EventKind, LogEntry};
use crate::log_store;
use crate::paths::LogPaths;
use crate::probe::{self, ProcessInspector};
use crate::util::file_name_of;

/// Exit code marking a failure detected by probing, not confirmed by the log.
pub const DETECTED_FAILURE_EXIT_CODE: i32 = -2;

/// Default retention window for status views, in days.
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Badge window: a "currently running" count only trusts recent starts.
const RUNNING_BADGE_WINDOW_HOURS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Authoritative per-run view, derived on every query.
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub run_id: String,
    pub command_name: String,
    pub full_command: String,
    pub target_file: String,
    pub target_path: String,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    /// Seconds.
    pub duration: Option<f64>,
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub pid: Option<u32>,
    pub log_path: PathBuf,
}

#[derive(Debug, Default)]
pub struct RunBuckets {
    pub running: Vec<RunInfo>,
    pub completed: Vec<RunInfo>,
    pub failed: Vec<RunInfo>,
}

/* ---------------- grouping and reconstruction ---------------- */

/// Group events strictly by run id. Cross-run ordering in the file carries no
/// guarantee; ordering happens per group during reconstruction.
pub fn group_by_run(entries: &[LogEntry]) -> BTreeMap<String, Vec<LogEntry>> {
    let mut grouped: BTreeMap<String, Vec<LogEntry>> = BTreeMap::new();
    for entry in entries {
        grouped
            .entry(entry.run_id.clone())
            .or_default()
            .push(entry.clone());
    }
    grouped
}

/// Latest-known field value, preferring the most specific event: terminal
/// events over `executing` over `started`, since later events may carry more
/// accurate values than the initial guess.
fn pick_field<'a, T, F>(sorted: &'a [LogEntry], get: F) -> Option<T>
where
    F: Fn(&'a LogEntry) -> Option<T>,
{
    let by_kind = |pred: fn(&LogEntry) -> bool| {
        sorted.iter().rev().filter(move |e| pred(e)).find_map(&get)
    };

    by_kind(|e| e.event.is_terminal())
        .or_else(|| by_kind(|e| e.event == EventKind::Executing))
        .or_else(|| by_kind(|e| e.event == EventKind::Started))
}

fn extract_command_name(cmd: &str) -> String {
    // `/legal-router "/path/to/file.pdf"` -> `legal-router`
    // Compiled once; this runs for every run of every status query.
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^/([a-zA-Z0-9-]+)").expect("static regex"));
    re.captures(cmd)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| cmd.to_string())
}

/// Derive a single authoritative `RunInfo` from one run's events.
///
/// Pure over `(events, optional inspector, now)`: tests inject a fake
/// inspector instead of spawning processes. Returns `None` for runs without a
/// `started` event; those are unreconstructable and dropped entirely rather
/// than partially displayed.
pub fn extract_run_info(
    run_id: &str,
    logs: &[LogEntry],
    inspector: Option<&dyn ProcessInspector>,
    now: NaiveDateTime,
    paths: &LogPaths,
) -> Option<RunInfo> {
    if logs.is_empty() {
        return None;
    }

    let mut sorted: Vec<LogEntry> = logs.to_vec();
    sorted.sort_by_key(|e| e.parsed_ts().unwrap_or(NaiveDateTime::MIN));

    let started = sorted.iter().find(|e| e.event == EventKind::Started)?;
    let start_time = started.parsed_ts()?;

    let target = pick_field(&sorted, |e| e.target.clone()).unwrap_or_else(|| "unknown".into());
    let work_dir = pick_field(&sorted, |e| e.work_dir.clone()).unwrap_or_else(|| "unknown".into());
    let command = pick_field(&sorted, |e| e.cmd.clone()).unwrap_or_else(|| "unknown".into());
    let pid = pick_field(&sorted, |e| e.pid);

    // Display-only distinction between "file was processed" and "no-file
    // command" runs; never affects status.
    let target_file = if probe::looks_like_path(&target) {
        file_name_of(&target)
    } else {
        "(command)".to_string()
    };

    let completed_event = sorted.iter().find(|e| e.event == EventKind::Completed);
    let failed_event = sorted.iter().find(|e| e.event == EventKind::Failed);

    let (status, end_time, duration, exit_code) = if let Some(done) = completed_event {
        (
            RunStatus::Completed,
            done.parsed_ts(),
            done.duration_secs(),
            None,
        )
    } else if let Some(fail) = failed_event {
        (
            RunStatus::Failed,
            fail.parsed_ts(),
            fail.duration_secs(),
            fail.exit_code,
        )
    } else if let (Some(pid), Some(inspector)) = (pid, inspector) {
        let live = probe::classify(&sorted, inspector, pid, run_id, &target);
        let synthesized_duration =
            (now - start_time).num_milliseconds() as f64 / 1000.0;
        match live.status {
            RunStatus::Completed => {
                (RunStatus::Completed, Some(now), Some(synthesized_duration), None)
            }
            RunStatus::Failed => (
                RunStatus::Failed,
                Some(now),
                Some(synthesized_duration),
                Some(DETECTED_FAILURE_EXIT_CODE),
            ),
            RunStatus::Running => (RunStatus::Running, None, None, None),
        }
    } else {
        // No terminal event and no pid: cannot be disproven, so running.
        (RunStatus::Running, None, None, None)
    };

    Some(RunInfo {
        run_id: run_id.to_string(),
        command_name: extract_command_name(&command),
        full_command: command,
        target_file,
        target_path: work_dir,
        start_time,
        end_time,
        duration,
        status,
        exit_code,
        pid,
        log_path: paths.transcript(run_id),
    })
}

/* ---------------- registry / query layer ---------------- */

/// Reconstruct every run and bucket by status, most recent start first.
pub fn categorize(
    entries: &[LogEntry],
    inspector: Option<&dyn ProcessInspector>,
    now: NaiveDateTime,
    paths: &LogPaths,
) -> RunBuckets {
    let mut buckets = RunBuckets::default();

    for (run_id, logs) in group_by_run(entries) {
        let Some(info) = extract_run_info(&run_id, &logs, inspector, now, paths) else {
            continue;
        };
        match info.status {
            RunStatus::Running => buckets.running.push(info),
            RunStatus::Completed => buckets.completed.push(info),
            RunStatus::Failed => buckets.failed.push(info),
        }
    }

    for bucket in [
        &mut buckets.running,
        &mut buckets.completed,
        &mut buckets.failed,
    ] {
        bucket.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    }

    buckets
}

/// Drop runs whose start time is older than `days` days before `now`.
pub fn filter_recent(runs: Vec<RunInfo>, days: i64, now: NaiveDateTime) -> Vec<RunInfo> {
    let cutoff = now - Duration::days(days);
    runs.into_iter()
        .filter(|r| r.start_time >= cutoff)
        .collect()
}

/// Categorized snapshot with the default display retention applied.
pub fn all_run_status(
    paths: &LogPaths,
    inspector: Option<&dyn ProcessInspector>,
    days: i64,
    now: NaiveDateTime,
) -> RunBuckets {
    let entries = log_store::read_all(paths);
    let buckets = categorize(&entries, inspector, now, paths);
    RunBuckets {
        running: filter_recent(buckets.running, days, now),
        completed: filter_recent(buckets.completed, days, now),
        failed: filter_recent(buckets.failed, days, now),
    }
}

/// Lightweight badge count: running runs started within the last hour.
///
/// Deliberately tighter than the 7-day display window so long-abandoned
/// entries never count as currently active.
pub fn count_running(
    entries: &[LogEntry],
    inspector: Option<&dyn ProcessInspector>,
    now: NaiveDateTime,
    paths: &LogPaths,
) -> usize {
    let cutoff = now - Duration::hours(RUNNING_BADGE_WINDOW_HOURS);
    categorize(entries, inspector, now, paths)
        .running
        .iter()
        .filter(|r| r.start_time >= cutoff)
        .count()
}

/// Reconstruct a single run by id.
pub fn find_run(
    paths: &LogPaths,
    inspector: Option<&dyn ProcessInspector>,
    run_id: &str,
    now: NaiveDateTime,
) -> Option<RunInfo> {
    let entries = log_store::read_all(paths);
    let grouped = group_by_run(&entries);
    let logs = grouped.get(run_id)?;
    extract_run_info(run_id, logs, inspector, now, paths)
}

/* ---------------- clear history ---------------- */

#[derive(Debug, PartialEq, Eq)]
pub struct ClearOutcome {
    /// Transcript files actually removed from disk.
    pub deleted: usize,
    /// Runs whose events were preserved.
    pub running: usize,
}

/// Destructive cleanup: delete transcripts of finished runs and rewrite the
/// event log keeping only events of runs currently classified as running.
///
/// Safety invariant: no event belonging to a running run is ever dropped. The
/// retained set is keyed by the reconstructed running run ids, so a run kept
/// as running keeps every one of its events. Index and error logs are
/// truncated wholesale; they are display-only.
pub fn clear_history(
    paths: &LogPaths,
    inspector: Option<&dyn ProcessInspector>,
    now: NaiveDateTime,
) -> Result<ClearOutcome> {
    let entries = log_store::read_all(paths);
    let buckets = categorize(&entries, inspector, now, paths);

    let mut deleted = 0usize;
    for run in buckets.completed.iter().chain(buckets.failed.iter()) {
        if run.log_path.exists() {
            match std::fs::remove_file(&run.log_path) {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::warn!(error = %e, path = %run.log_path.display(), "failed to delete transcript")
                }
            }
        }
    }

    let running_ids: HashSet<&str> = buckets
        .running
        .iter()
        .map(|r| r.run_id.as_str())
        .collect();
    let retained: Vec<LogEntry> = entries
        .iter()
        .filter(|e| running_ids.contains(e.run_id.as_str()))
        .cloned()
        .collect();
    log_store::rewrite(paths, &retained)?;

    log_store::truncate_if_exists(&paths.index_file);
    log_store::truncate_if_exists(&paths.error_log);

    Ok(ClearOutcome {
        deleted,
        running: buckets.running.len(),
    })
}

// src/probe.rs

//! Process liveness probing.
//!
//! The event log alone cannot answer "is this run still alive": a crashed
//! writer leaves no terminal event. This module correlates log-derived pids
//! with actual OS process state.
//!
//! The reconstruction logic only talks to the [`ProcessInspector`] trait so it
//! stays platform-agnostic and unit-testable with a fake inspector. The
//! production implementation combines a null-signal probe with the sysinfo
//! process table; elapsed time comes from `ps -o etime=` on unix.

use std::time::Duration;

use sysinfo::{Pid, ProcessStatus, System};

use crate::events::{EventKind, LogEntry};
use crate::status::RunStatus;

/// A process running longer than this is treated as stuck.
pub const STUCK_THRESHOLD_HOURS: f64 = 0.5;

/// Scheduling state as reported by the OS process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Running,
    Sleeping,
    Stopped,
    /// Exited but not reaped: signalable, but not truly running.
    Zombie,
    NotFound,
    Unknown,
}

/// OS-level primitives behind the reconstruction logic.
pub trait ProcessInspector {
    /// Null-signal probe plus process-table check. A zombie is not alive.
    fn is_alive(&self, pid: u32) -> bool;

    /// Scheduling state from the process table.
    fn state(&self, pid: u32) -> ProcState;

    /// Elapsed running time, normalized to hours. `None` when the process
    /// cannot be inspected; ambiguity is treated conservatively by callers.
    fn elapsed_hours(&self, pid: u32) -> Option<f64>;
}

/* ---------------- production inspector ---------------- */

/// Inspector backed by the live OS.
#[derive(Debug, Default)]
pub struct SystemInspector;

impl SystemInspector {
    fn table_state(&self, pid: u32) -> ProcState {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        if !system.refresh_process(pid) {
            return ProcState::NotFound;
        }
        match system.process(pid) {
            Some(process) => match process.status() {
                ProcessStatus::Run => ProcState::Running,
                ProcessStatus::Sleep | ProcessStatus::Idle => ProcState::Sleeping,
                ProcessStatus::Stop => ProcState::Stopped,
                ProcessStatus::Zombie => ProcState::Zombie,
                _ => ProcState::Unknown,
            },
            None => ProcState::NotFound,
        }
    }
}

impl ProcessInspector for SystemInspector {
    fn is_alive(&self, pid: u32) -> bool {
        #[cfg(unix)]
        {
            // Signal 0 probes without delivering; ESRCH/EPERM both read as
            // "not ours to observe" and therefore not alive.
            let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
            if rc != 0 {
                return false;
            }
        }

        // A successful probe is not sufficient: a zombie has exited but not
        // been reaped and must not count as running.
        !matches!(
            self.table_state(pid),
            ProcState::Zombie | ProcState::NotFound
        )
    }

    fn state(&self, pid: u32) -> ProcState {
        self.table_state(pid)
    }

    fn elapsed_hours(&self, pid: u32) -> Option<f64> {
        #[cfg(unix)]
        {
            if let Some(hours) = ps_elapsed_hours(pid) {
                return Some(hours);
            }
        }

        let sys_pid = Pid::from_u32(pid);
        let mut system = System::new();
        if !system.refresh_process(sys_pid) {
            return None;
        }
        system
            .process(sys_pid)
            .map(|p| p.run_time() as f64 / 3600.0)
    }
}

#[cfg(unix)]
fn ps_elapsed_hours(pid: u32) -> Option<f64> {
    let output = std::process::Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "etime="])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let etime = String::from_utf8_lossy(&output.stdout).trim().to_string();
    parse_etime_hours(&etime)
}

/// Parse the `ps` elapsed-time representation into total hours.
///
/// Accepted formats: `mm:ss`, `hh:mm:ss`, `dd-hh:mm:ss`.
pub fn parse_etime_hours(etime: &str) -> Option<f64> {
    let etime = etime.trim();
    if etime.is_empty() {
        return None;
    }

    let (days, clock) = match etime.split_once('-') {
        Some((d, rest)) => (d.parse::<f64>().ok()?, rest),
        None => (0.0, etime),
    };

    let parts: Vec<f64> = clock
        .split(':')
        .map(|p| p.parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;

    let hours = match parts.as_slice() {
        [mm, ss] => mm / 60.0 + ss / 3600.0,
        [hh, mm, ss] => hh + mm / 60.0 + ss / 3600.0,
        _ => return None,
    };

    Some(days * 24.0 + hours)
}

/* ---------------- heuristics over log + inspector ---------------- */

/// Best-effort "did this run produce anything visible" check. Any one signal
/// is sufficient:
/// 1. a terminal event for the run with non-empty output,
/// 2. the target file (when it is a real path) modified within 24 hours,
/// 3. the process table showing the pid running or sleeping.
pub fn has_produced_output(
    entries: &[LogEntry],
    inspector: &dyn ProcessInspector,
    pid: u32,
    run_id: &str,
    target_path: &str,
) -> bool {
    let terminal_output = entries.iter().any(|e| {
        e.run_id == run_id
            && e.event.is_terminal()
            && e.output.as_deref().is_some_and(|o| !o.is_empty())
    });
    if terminal_output {
        return true;
    }

    if looks_like_path(target_path) {
        if let Ok(meta) = std::fs::metadata(target_path) {
            if let Ok(modified) = meta.modified() {
                let age = modified.elapsed().unwrap_or(Duration::ZERO);
                if age < Duration::from_secs(24 * 60 * 60) {
                    return true;
                }
            }
        }
    }

    matches!(
        inspector.state(pid),
        ProcState::Running | ProcState::Sleeping
    )
}

/// True when the OS-reported elapsed running time exceeds 30 minutes.
pub fn is_stuck(inspector: &dyn ProcessInspector, pid: u32) -> bool {
    inspector
        .elapsed_hours(pid)
        .is_some_and(|h| h > STUCK_THRESHOLD_HOURS)
}

/// Outcome of the composite live-state decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveClassification {
    pub alive: bool,
    pub has_output: bool,
    pub status: RunStatus,
}

/// Composite decision for runs whose log never reached a terminal event.
///
/// - not alive + produced output  => completed
/// - alive + stuck                => failed (hung process, surfaced for the
///   operator rather than left optimistic)
/// - alive + not stuck            => running
/// - not alive + no output        => failed
///
/// This is strictly a fallback for log silence; it never overrides an
/// explicit terminal event.
pub fn classify(
    entries: &[LogEntry],
    inspector: &dyn ProcessInspector,
    pid: u32,
    run_id: &str,
    target_path: &str,
) -> LiveClassification {
    let alive = inspector.is_alive(pid);
    let has_output = has_produced_output(entries, inspector, pid, run_id, target_path);

    if !alive && has_output {
        return LiveClassification {
            alive: false,
            has_output: true,
            status: RunStatus::Completed,
        };
    }

    if alive && is_stuck(inspector, pid) {
        return LiveClassification {
            alive: true,
            has_output,
            status: RunStatus::Failed,
        };
    }

    LiveClassification {
        alive,
        has_output,
        status: if alive {
            RunStatus::Running
        } else {
            RunStatus::Failed
        },
    }
}

/// A bare command label is not a filesystem target; only absolute or
/// home-anchored paths count for the mtime heuristic.
pub fn looks_like_path(target: &str) -> bool {
    target.contains('/') && (target.starts_with('/') || target.starts_with('~'))
}

/// Best-effort termination of a run's process. Returns whether a signal was
/// actually delivered; the event log is never rewritten by this.
pub fn kill_process(pid: u32) -> bool {
    let sys_pid = Pid::from_u32(pid);
    let mut system = System::new();
    if !system.refresh_process(sys_pid) {
        return false;
    }
    system.process(sys_pid).map(|p| p.kill()).unwrap_or(false)
}

/// Scripted inspector for classification tests; no real processes involved.
#[cfg(test)]
pub(crate) mod testutil {
    use super::{ProcState, ProcessInspector};

    pub(crate) struct FakeInspector {
        pub alive: bool,
        pub state: ProcState,
        pub elapsed_hours: Option<f64>,
    }

    impl ProcessInspector for FakeInspector {
        fn is_alive(&self, _pid: u32) -> bool {
            self.alive
        }
        fn state(&self, _pid: u32) -> ProcState {
            self.state
        }
        fn elapsed_hours(&self, _pid: u32) -> Option<f64> {
            self.elapsed_hours
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::FakeInspector;
    use super::*;
    use crate::events::completed;
    use crate::run_id::RunId;

    #[test]
    fn etime_formats_normalize_to_hours() {
        assert_eq!(parse_etime_hours("30:00"), Some(0.5));
        assert_eq!(parse_etime_hours("02:30:00"), Some(2.5));
        assert_eq!(parse_etime_hours("1-02:00:00"), Some(26.0));
        assert_eq!(parse_etime_hours(""), None);
        assert_eq!(parse_etime_hours("bogus"), None);
    }

    #[test]
    fn dead_pid_without_output_is_failed() {
        let fake = FakeInspector {
            alive: false,
            state: ProcState::NotFound,
            elapsed_hours: None,
        };
        let c = classify(&[], &fake, 4321, "run_a", "not-a-path");
        assert_eq!(c.status, RunStatus::Failed);
        assert!(!c.alive);
    }

    #[test]
    fn dead_pid_with_logged_output_is_completed() {
        let id = RunId("run_a".to_string());
        let entries = vec![completed(&id, 3.0, Some(4321), "/x", "/w", "/c", "wrote report")];
        let fake = FakeInspector {
            alive: false,
            state: ProcState::NotFound,
            elapsed_hours: None,
        };
        let c = classify(&entries, &fake, 4321, "run_a", "not-a-path");
        assert_eq!(c.status, RunStatus::Completed);
        assert!(c.has_output);
    }

    #[test]
    fn live_pid_under_threshold_is_running() {
        let fake = FakeInspector {
            alive: true,
            state: ProcState::Sleeping,
            elapsed_hours: Some(0.2),
        };
        let c = classify(&[], &fake, 4321, "run_a", "not-a-path");
        assert_eq!(c.status, RunStatus::Running);
    }

    #[test]
    fn live_pid_over_threshold_is_stuck_failed() {
        let fake = FakeInspector {
            alive: true,
            state: ProcState::Running,
            elapsed_hours: Some(0.6),
        };
        let c = classify(&[], &fake, 4321, "run_a", "not-a-path");
        assert_eq!(c.status, RunStatus::Failed);
        assert!(c.alive);
    }

    #[test]
    fn unknown_elapsed_time_is_not_stuck() {
        let fake = FakeInspector {
            alive: true,
            state: ProcState::Running,
            elapsed_hours: None,
        };
        assert!(!is_stuck(&fake, 4321));
        assert_eq!(
            classify(&[], &fake, 4321, "run_a", "x").status,
            RunStatus::Running
        );
    }

    #[test]
    fn sleeping_state_counts_as_produced_output() {
        let fake = FakeInspector {
            alive: true,
            state: ProcState::Sleeping,
            elapsed_hours: Some(0.1),
        };
        assert!(has_produced_output(&[], &fake, 1, "run_a", "bare-label"));
    }

    #[test]
    fn zombie_state_does_not_count_as_output() {
        let fake = FakeInspector {
            alive: false,
            state: ProcState::Zombie,
            elapsed_hours: None,
        };
        assert!(!has_produced_output(&[], &fake, 1, "run_a", "bare-label"));
    }

    #[test]
    fn recently_modified_target_counts_as_output() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("report.pdf");
        std::fs::write(&target, b"fresh").unwrap();

        let fake = FakeInspector {
            alive: false,
            state: ProcState::NotFound,
            elapsed_hours: None,
        };
        assert!(has_produced_output(
            &[],
            &fake,
            1,
            "run_a",
            target.to_str().unwrap()
        ));
    }

    #[test]
    fn path_detection_rejects_bare_labels() {
        assert!(looks_like_path("/x/report.pdf"));
        assert!(looks_like_path("~/docs/a.md"));
        assert!(!looks_like_path("legal-router"));
        assert!(!looks_like_path("a/b"));
    }

    #[test]
    fn own_process_is_alive_and_not_zombie() {
        let inspector = SystemInspector;
        let pid = std::process::id();
        assert!(inspector.is_alive(pid));
        assert!(matches!(
            inspector.state(pid),
            ProcState::Running | ProcState::Sleeping | ProcState::Unknown
        ));
    }

    #[test]
    fn nonexistent_pid_is_not_alive() {
        let inspector = SystemInspector;
        // Near the typical pid_max; vanishingly unlikely to be in use.
        assert!(!inspector.is_alive(4_000_000));
        assert_eq!(inspector.state(4_000_000), ProcState::NotFound);
        assert_eq!(inspector.elapsed_hours(4_000_000), None);
    }
}

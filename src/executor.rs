// src/executor.rs

//! Spawning and supervising the external agent process.
//!
//! The agent is a separate OS process, not a thread: the only shared state
//! with this program is the event log and the OS process table. Output is
//! streamed as it arrives, so the transcript fills in while the run is active
//! and a timed-out run still surfaces whatever it printed before the
//! deadline. A single fixed timeout bounds every execution; timeout is
//! terminal and surfaced as a failure with the synthetic exit code -1.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::sync::mpsc;

use crate::runlog::RunLogger;

/// Fixed per-execution timeout (5 minutes). Deliberately not configurable
/// per command; timeout is terminal, there is no retry.
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;

/// Synthetic exit code for a timed-out or force-cancelled execution.
pub const TIMEOUT_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone)]
pub struct AgentInvocation {
    /// Agent binary, e.g. `~/.local/bin/agent` after tilde expansion.
    pub bin: PathBuf,
    /// Fixed arguments placed before the prompt, e.g. `--print`.
    pub args_prefix: Vec<String>,
    /// The full prompt string handed to the agent.
    pub prompt: String,
    /// Working directory the agent runs in.
    pub work_dir: PathBuf,
    pub timeout_ms: u64,
}

#[derive(Debug)]
pub struct ExecutionOutcome {
    pub success: bool,
    /// Combined stdout + stderr.
    pub output: String,
    pub exit_code: i32,
    pub duration_ms: u128,
    pub pid: Option<u32>,
}

enum Chunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

/// Forward raw chunks from a child pipe until EOF or the receiver hangs up.
async fn pump<R>(mut reader: R, tx: mpsc::Sender<Chunk>, wrap: fn(Vec<u8>) -> Chunk)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send(wrap(buf[..n].to_vec())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Spawn the agent, emit `executing` once the pid is known, stream its output,
/// and wait for exit or timeout. The caller appends the terminal event from
/// the returned outcome; this function never fails outward — spawn errors
/// become failed outcomes with exit code 1.
pub async fn execute_agent(
    invocation: &AgentInvocation,
    logger: &mut RunLogger,
) -> ExecutionOutcome {
    let start = Instant::now();

    let mut cmd = TokioCommand::new(&invocation.bin);
    cmd.args(&invocation.args_prefix)
        .arg(&invocation.prompt)
        .current_dir(&invocation.work_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return ExecutionOutcome {
                success: false,
                output: format!("Failed to spawn agent process: {e}"),
                exit_code: 1,
                duration_ms: start.elapsed().as_millis(),
                pid: None,
            };
        }
    };

    // The pid only exists after spawn; until this line the run is visible in
    // the log as `started` with no pid.
    let pid = child.id();
    logger.log_executing(&invocation.prompt, pid);

    let (tx, mut rx) = mpsc::channel::<Chunk>(32);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump(stdout, tx.clone(), Chunk::Stdout));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump(stderr, tx.clone(), Chunk::Stderr));
    }
    drop(tx);

    let deadline = tokio::time::Instant::now() + Duration::from_millis(invocation.timeout_ms);
    let mut stdout_buf: Vec<u8> = Vec::new();
    let mut stderr_buf: Vec<u8> = Vec::new();
    let mut timed_out = false;

    // Drain until both pipes close or the deadline fires. On timeout the
    // chunks already received stay in the buffers so the outcome can carry
    // the partial output.
    loop {
        tokio::select! {
            chunk = rx.recv() => match chunk {
                Some(Chunk::Stdout(bytes)) => {
                    logger.log_output_chunk(&String::from_utf8_lossy(&bytes));
                    stdout_buf.extend_from_slice(&bytes);
                }
                Some(Chunk::Stderr(bytes)) => stderr_buf.extend_from_slice(&bytes),
                None => break,
            },
            _ = tokio::time::sleep_until(deadline) => {
                timed_out = true;
                let _ = child.start_kill();
                break;
            }
        }
    }

    // Pipes closing does not prove exit: a child can close them and keep
    // running, so the wait itself is still bounded by the same deadline.
    let status = if timed_out {
        child.wait().await
    } else {
        match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(status) => status,
            Err(_elapsed) => {
                timed_out = true;
                let _ = child.start_kill();
                child.wait().await
            }
        }
    };

    let duration_ms = start.elapsed().as_millis();
    let stdout = String::from_utf8_lossy(&stdout_buf).to_string();
    let stderr = String::from_utf8_lossy(&stderr_buf).to_string();
    let combined = if stderr.trim().is_empty() {
        stdout
    } else {
        format!("{stdout}\n\n=== stderr ===\n{stderr}")
    };

    if timed_out {
        let message = format!(
            "Execution timed out after {} seconds",
            invocation.timeout_ms / 1000
        );
        let output = if combined.trim().is_empty() {
            message
        } else {
            format!("{combined}\n\n{message}")
        };
        return ExecutionOutcome {
            success: false,
            output,
            exit_code: TIMEOUT_EXIT_CODE,
            duration_ms,
            pid,
        };
    }

    match status {
        Ok(status) => ExecutionOutcome {
            success: status.success(),
            output: combined,
            exit_code: status.code().unwrap_or(TIMEOUT_EXIT_CODE),
            duration_ms,
            pid,
        },
        Err(e) => ExecutionOutcome {
            success: false,
            output: format!("Failed while waiting for agent process: {e}"),
            exit_code: 1,
            duration_ms,
            pid,
        },
    }
}

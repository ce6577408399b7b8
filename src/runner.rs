// src/runner.rs

use crate::cli::{Cli, Command};
use crate::commands;
use crate::config::Config;
use crate::events::{force_failed, now_local};
use crate::executor::{execute_agent, AgentInvocation, DEFAULT_TIMEOUT_MS};
use crate::log_store;
use crate::paths::LogPaths;
use crate::probe::{self, SystemInspector};
use crate::refresh::StatusBus;
use crate::runlog::RunLogger;
use crate::status::{self, RunInfo, RunStatus};

use anyhow::{bail, Context, Result};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

/// Entry point from `main.rs`.
pub async fn run(cli: Cli) -> Result<()> {
    let cfg = Config::load_or_default(cli.config.as_deref())?;
    let paths = LogPaths::new(&cfg.logs_base());

    match cli.command {
        Command::Run {
            command,
            file,
            project,
        } => run_command(&cfg, &paths, &command, file, project).await,

        Command::List => list_commands(&cfg),

        Command::Status {
            days,
            watch,
            json,
            count,
        } => {
            let days = days.unwrap_or(cfg.retention_days);
            if count {
                return print_running_count(&paths);
            }
            if watch {
                watch_status(&paths, days).await
            } else {
                show_status(&paths, days, json)
            }
        }

        Command::Logs { run_id } => print_transcript(&paths, &run_id),

        Command::Clear { yes } => clear_history(&paths, yes),

        Command::Kill { run_id } => kill_run(&paths, &run_id),

        Command::MarkFailed { run_id } => mark_failed(&paths, &run_id),
    }
}

/* ---------------- run ---------------- */

async fn run_command(
    cfg: &Config,
    paths: &LogPaths,
    name: &str,
    file: Option<PathBuf>,
    project: Option<PathBuf>,
) -> Result<()> {
    let project_dirs = cfg.valid_project_dirs()?;
    let available = commands::discover(&project_dirs, &cfg.commands_dir);

    let Some(template) = commands::find_command(&available, name) else {
        let known: Vec<&str> = available.iter().map(|c| c.name.as_str()).collect();
        bail!(
            "Unknown command {:?}. Available commands: {}",
            name,
            if known.is_empty() {
                "(none)".to_string()
            } else {
                known.join(", ")
            }
        );
    };

    let work_dir = match project {
        Some(dir) => dir,
        None => template.project_dir.clone(),
    };

    // The started event's target is the file when one is given, otherwise the
    // bare command label; reconstruction uses this distinction for display.
    let (target, prompt) = match &file {
        Some(path) => {
            if !path.exists() {
                bail!("Target file does not exist: {}", path.display());
            }
            let target = path.to_string_lossy().to_string();
            (target.clone(), format!("{} \"{}\"", template.prompt, target))
        }
        None => (template.name.clone(), template.prompt.clone()),
    };

    let bus = StatusBus::new();
    let badge_paths = paths.clone();
    let _badge = bus.subscribe(move || {
        let entries = log_store::read_all(&badge_paths);
        let inspector = SystemInspector;
        let running =
            status::count_running(&entries, Some(&inspector), now_local(), &badge_paths);
        eprintln!("{running} command(s) currently running");
    });

    let mut logger = RunLogger::new(paths, &target, &work_dir.to_string_lossy());
    logger.log_validated();

    let invocation = AgentInvocation {
        bin: cfg.agent_bin(),
        args_prefix: cfg.agent.args.clone(),
        prompt,
        work_dir,
        timeout_ms: DEFAULT_TIMEOUT_MS,
    };

    eprintln!("Running {} ({})", template.name, logger.run_id());
    let outcome = execute_agent(&invocation, &mut logger).await;
    logger.log_completed(&outcome.output, outcome.exit_code);
    bus.publish();

    let use_color = should_use_color();
    let secs = outcome.duration_ms as f64 / 1000.0;
    if outcome.success {
        println!(
            "{} {} in {}",
            paint("OK", "32", use_color),
            template.name,
            format_duration(secs)
        );
    } else {
        println!(
            "{} {} in {} (exit code {})",
            paint("FAIL", "31", use_color),
            template.name,
            format_duration(secs),
            outcome.exit_code
        );
    }
    if !outcome.output.trim().is_empty() {
        println!("{}", outcome.output.trim_end());
    }
    println!("transcript: {}", logger.log_path().display());

    if !outcome.success {
        bail!("Run failed");
    }
    Ok(())
}

/* ---------------- list ---------------- */

fn list_commands(cfg: &Config) -> Result<()> {
    let project_dirs = cfg.valid_project_dirs()?;
    let available = commands::discover(&project_dirs, &cfg.commands_dir);

    if available.is_empty() {
        println!("No command templates found.");
        return Ok(());
    }

    let widest = available.iter().map(|c| c.name.len()).max().unwrap_or(0);
    for cmd in &available {
        println!(
            "{:widest$}  {}  [{}]",
            cmd.name, cmd.description, cmd.project_name
        );
    }
    Ok(())
}

/* ---------------- status views ---------------- */

fn print_running_count(paths: &LogPaths) -> Result<()> {
    let entries = log_store::read_all(paths);
    let inspector = SystemInspector;
    let count = status::count_running(&entries, Some(&inspector), now_local(), paths);
    println!("{count}");
    Ok(())
}

fn show_status(paths: &LogPaths, days: i64, json: bool) -> Result<()> {
    let inspector = SystemInspector;
    let buckets = status::all_run_status(paths, Some(&inspector), days, now_local());

    if json {
        let payload = serde_json::json!({
            "running": buckets.running,
            "completed": buckets.completed,
            "failed": buckets.failed,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let use_color = should_use_color();
    render_bucket("Running", &buckets.running, "33", use_color);
    render_bucket("Completed", &buckets.completed, "32", use_color);
    render_bucket("Failed", &buckets.failed, "31", use_color);
    Ok(())
}

async fn watch_status(paths: &LogPaths, days: i64) -> Result<()> {
    loop {
        clear_screen();
        show_status(paths, days, false)?;
        tokio::time::sleep(Duration::from_secs(3)).await;
    }
}

fn render_bucket(label: &str, runs: &[RunInfo], color: &str, use_color: bool) {
    println!("{} ({})", paint(label, color, use_color), runs.len());
    for run in runs {
        let duration = run
            .duration
            .map(format_duration)
            .unwrap_or_else(|| "in progress".to_string());
        let exit = match (run.status, run.exit_code) {
            (RunStatus::Failed, Some(status::DETECTED_FAILURE_EXIT_CODE)) => {
                " exit=-2 (detected)".to_string()
            }
            (RunStatus::Failed, Some(code)) => format!(" exit={code}"),
            _ => String::new(),
        };
        println!(
            "  {}  {}  {}  started {}  {}{}",
            run.run_id, run.command_name, run.target_file, run.start_time, duration, exit
        );
    }
    println!();
}

/* ---------------- transcript / history ---------------- */

fn print_transcript(paths: &LogPaths, run_id: &str) -> Result<()> {
    let path = paths.transcript(run_id);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("No transcript for {run_id} at {}", path.display()))?;
    print!("{text}");
    Ok(())
}

fn clear_history(paths: &LogPaths, yes: bool) -> Result<()> {
    if !yes {
        bail!("clear permanently deletes finished run history; re-run with --yes to confirm");
    }

    let inspector = SystemInspector;
    let outcome = status::clear_history(paths, Some(&inspector), now_local())?;
    println!(
        "Deleted {} transcript(s); preserved {} running run(s).",
        outcome.deleted, outcome.running
    );
    Ok(())
}

/* ---------------- cancellation ---------------- */

fn kill_run(paths: &LogPaths, run_id: &str) -> Result<()> {
    let inspector = SystemInspector;
    let run = status::find_run(paths, Some(&inspector), run_id, now_local())
        .with_context(|| format!("Unknown run id {run_id:?}"))?;

    let Some(pid) = run.pid else {
        bail!("Run {run_id} has no recorded pid; nothing to terminate");
    };

    // Advisory only: the started/executing events stay in the log; the next
    // status query re-probes and reclassifies.
    if probe::kill_process(pid) {
        println!("Signalled process {pid}.");
    } else {
        println!("Process {pid} no longer exists; nothing signalled.");
    }
    Ok(())
}

fn mark_failed(paths: &LogPaths, run_id: &str) -> Result<()> {
    let inspector = SystemInspector;
    let run = status::find_run(paths, Some(&inspector), run_id, now_local())
        .with_context(|| format!("Unknown run id {run_id:?}"))?;

    let duration_secs = (now_local() - run.start_time).num_milliseconds() as f64 / 1000.0;
    log_store::append(paths, &force_failed(run_id, duration_secs));
    println!("Marked {run_id} as failed (synthetic event; process untouched).");
    Ok(())
}

/* ---------------- rendering helpers ---------------- */

pub fn format_duration(secs: f64) -> String {
    if secs >= 60.0 {
        let minutes = (secs / 60.0).floor() as i64;
        format!("{minutes}m {:.0}s", secs - minutes as f64 * 60.0)
    } else {
        format!("{secs:.1}s")
    }
}

fn clear_screen() {
    use std::io::Write;
    print!("\x1b[2J\x1b[H");
    let _ = std::io::stdout().flush();
}

fn should_use_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::io::stdout().is_terminal()
}

fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("\x1b[{}m{}\x1b[0m", color, text)
    } else {
        text.to_string()
    }
}

// src/cli.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Local launcher for agent command templates.
///
/// `~/.autoweave/config.yaml` is the primary source of truth.
/// CLI flags only override config values.
#[derive(Parser, Debug)]
#[command(
    name = "autoweave",
    version,
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Path to config file
    ///
    /// Defaults to ~/.autoweave/config.yaml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// All supported CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command template through the agent.
    ///
    /// The template name is its file stem, e.g. `legal-router` for
    /// `legal-router.md`.
    Run {
        /// Command template name
        command: String,

        /// File the command acts on
        ///
        /// Appended to the prompt as a quoted path; omit for
        /// no-file commands.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Override the project directory the agent runs in
        #[arg(long)]
        project: Option<PathBuf>,
    },

    /// List discovered command templates.
    List,

    /// Show categorized run status (running / completed / failed).
    Status {
        /// Retention window in days
        #[arg(long)]
        days: Option<i64>,

        /// Re-render every few seconds until interrupted
        #[arg(long)]
        watch: bool,

        /// Emit machine-readable JSON instead of text
        #[arg(long)]
        json: bool,

        /// Print only the count of currently running commands
        #[arg(long)]
        count: bool,
    },

    /// Print the transcript of a run.
    Logs {
        /// Run id, e.g. run_20260823_101530_a3f9
        run_id: String,
    },

    /// Clear run history, keeping everything still running.
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Terminate a running command's process (best-effort).
    Kill {
        /// Run id of the command to terminate
        run_id: String,
    },

    /// Append a synthetic failed event for a run without touching its
    /// process. Unsticks status views when the process cannot be confirmed
    /// dead.
    MarkFailed {
        /// Run id to mark as failed
        run_id: String,
    },
}

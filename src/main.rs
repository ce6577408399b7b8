// src/main.rs

//! autoweave
//!
//! Entry point for the autoweave CLI.
//!
//! This binary is a local launcher for agent command templates: it discovers
//! markdown command definitions across configured projects, runs them through
//! an external agent process, and tracks every run in an append-only JSONL
//! event log that status views reconstruct on demand.
//!
//! Responsibilities of this file:
//! - Parse CLI arguments
//! - Initialise logging and the async runtime
//! - Hand off execution to the runner
//!
//! There is intentionally *no business logic* here.

mod cli;
mod commands;
mod config;
mod events;
mod executor;
mod log_store;
mod paths;
mod probe;
mod refresh;
mod run_id;
mod runlog;
mod runner;
mod status;
mod transcript;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Program entry point.
///
/// Uses Tokio because the runner spawns and waits on the agent child process
/// asynchronously, with a timeout racing the wait.
#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    runner::run(cli).await
}

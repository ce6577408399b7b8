// src/config.rs

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::commands::is_valid_project_dir;
use crate::util::expand_tilde;

/// Root configuration loaded from `~/.autoweave/config.yaml`.
///
/// This file controls:
/// - Which project directories are scanned for command templates
/// - Which agent binary is invoked and with what fixed arguments
/// - Where the run-tracking state lives
///
/// Users only need to edit the YAML file, not this Rust file.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Project directories containing command templates. `~` is expanded.
    #[serde(default)]
    pub projects: Vec<String>,

    /// Agent binary configuration
    #[serde(default)]
    pub agent: Agent,

    /// Commands subdirectory inside each project
    #[serde(default = "default_commands_dir")]
    pub commands_dir: String,

    /// Override for the log/state base directory
    #[serde(default)]
    pub logs_dir: Option<String>,

    /// Display retention window in days for status views
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

/// Agent binary configuration.
///
/// Example:
///
/// agent:
///   bin: ~/.local/bin/agent
///   args: ["--print"]
#[derive(Debug, Deserialize)]
pub struct Agent {
    #[serde(default = "default_agent_bin")]
    pub bin: String,

    /// Fixed arguments placed before the prompt.
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,
}

impl Default for Agent {
    fn default() -> Self {
        Self {
            bin: default_agent_bin(),
            args: default_agent_args(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            projects: Vec::new(),
            agent: Agent::default(),
            commands_dir: default_commands_dir(),
            logs_dir: None,
            retention_days: default_retention_days(),
        }
    }
}

fn default_commands_dir() -> String {
    ".agents/commands".to_string()
}

fn default_retention_days() -> i64 {
    crate::status::DEFAULT_RETENTION_DAYS
}

fn default_agent_bin() -> String {
    "~/.local/bin/agent".to_string()
}

fn default_agent_args() -> Vec<String> {
    vec!["--print".to_string()]
}

impl Config {
    /// Load and parse the YAML config from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let cfg: Config = serde_yaml::from_str(&raw).context("Failed to parse YAML config")?;
        Ok(cfg)
    }

    /// Load from an explicit path, or from the default location; a missing
    /// default file yields the built-in defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".autoweave")
            .join("config.yaml")
    }

    /// Tilde-expanded project dirs that actually contain the commands
    /// subdirectory. Errors when none qualify, listing what was configured.
    pub fn valid_project_dirs(&self) -> Result<Vec<PathBuf>> {
        let expanded: Vec<PathBuf> = self.projects.iter().map(|p| expand_tilde(p)).collect();
        let valid: Vec<PathBuf> = expanded
            .iter()
            .filter(|dir| is_valid_project_dir(dir, &self.commands_dir))
            .cloned()
            .collect();

        if valid.is_empty() {
            bail!(
                "No valid project directory found.\n\
                 Each project must contain a `{}` subdirectory.\n\
                 Configured:\n{}",
                self.commands_dir,
                expanded
                    .iter()
                    .map(|d| format!("  - {}", d.display()))
                    .collect::<Vec<_>>()
                    .join("\n")
            );
        }
        Ok(valid)
    }

    pub fn agent_bin(&self) -> PathBuf {
        expand_tilde(&self.agent.bin)
    }

    pub fn logs_base(&self) -> PathBuf {
        match &self.logs_dir {
            Some(dir) => expand_tilde(dir),
            None => crate::paths::LogPaths::default_base(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn minimal_yaml_fills_defaults() {
        let cfg: Config = serde_yaml::from_str("projects:\n  - /tmp/p1\n").unwrap();
        assert_eq!(cfg.commands_dir, ".agents/commands");
        assert_eq!(cfg.retention_days, 7);
        assert_eq!(cfg.agent.args, vec!["--print".to_string()]);
    }

    #[test]
    fn valid_project_dirs_rejects_projects_without_commands() {
        let with = tempdir().unwrap();
        std::fs::create_dir_all(with.path().join(".agents/commands")).unwrap();
        let without = tempdir().unwrap();

        let cfg = Config {
            projects: vec![
                with.path().to_string_lossy().to_string(),
                without.path().to_string_lossy().to_string(),
            ],
            ..Default::default()
        };

        let valid = cfg.valid_project_dirs().unwrap();
        assert_eq!(valid, vec![with.path().to_path_buf()]);
    }

    #[test]
    fn no_valid_projects_is_an_error() {
        let cfg = Config {
            projects: vec!["/definitely/not/here".to_string()],
            ..Default::default()
        };
        assert!(cfg.valid_project_dirs().is_err());
    }

    #[test]
    fn load_or_default_reads_explicit_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "retention_days: 14\n").unwrap();

        let cfg = Config::load_or_default(Some(&path)).unwrap();
        assert_eq!(cfg.retention_days, 14);
    }
}

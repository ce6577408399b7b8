// src/util.rs

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Read a UTF-8 file into a String with a clear error message.
///
/// This is mainly used for:
/// - command template files
/// - config YAML
pub fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file {:?}", path))
}

/// Ensure a directory exists (create it if missing).
///
/// This is used when:
/// - creating the log directory tree
/// - writing the first transcript of a run
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory {:?}", path))
}

/// Expand a leading `~` to the user's home directory.
///
/// Paths without a leading `~` are returned unchanged.
pub fn expand_tilde(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(raw)
}

/// Truncate captured output to at most `max` characters.
///
/// The cut respects character boundaries so the result stays valid UTF-8.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect()
}

/// Extract the final path component for display.
///
/// Falls back to the input when it has no separator.
pub fn file_name_of(path: &str) -> String {
    path.rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(path)
        .to_string()
}

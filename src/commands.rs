// src/commands.rs

//! Command template discovery.
//!
//! Templates are markdown files under `<project>/<commands_dir>/`. The file
//! stem is the command name; an optional YAML frontmatter block supplies a
//! description; a leading `@include <path>` directive delegates the body to
//! another file. Discovery produces the `{name, description, prompt}` records
//! the launcher runs against.

use anyhow::Result;
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::util::{expand_tilde, read_to_string};

#[derive(Debug, Clone)]
pub struct CommandTemplate {
    pub name: String,
    pub description: String,
    pub file_name: String,
    pub file_path: PathBuf,
    /// Slash-command form handed to the agent, e.g. `/legal-router`.
    pub prompt: String,
    pub project_dir: PathBuf,
    pub project_name: String,
}

/// A project directory is valid when it contains the commands subdirectory.
pub fn is_valid_project_dir(dir: &Path, commands_subdir: &str) -> bool {
    dir.join(commands_subdir).is_dir()
}

/// Last path component, with a leading dot stripped for hidden directories.
pub fn project_name(dir: &Path) -> String {
    let last = dir
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .filter(|s| !s.is_empty() && *s != "/")
        .last()
        .unwrap_or("project");
    last.strip_prefix('.').unwrap_or(last).to_string()
}

/// Scan every configured project directory for command templates, sorted by
/// name. Unreadable files are skipped; a project without the commands
/// subdirectory contributes nothing.
pub fn discover(project_dirs: &[PathBuf], commands_subdir: &str) -> Vec<CommandTemplate> {
    let mut all = Vec::new();

    for project_dir in project_dirs {
        let commands_dir = project_dir.join(commands_subdir);
        if !commands_dir.is_dir() {
            continue;
        }

        for entry in WalkDir::new(&commands_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            if !file_name.ends_with(".md")
                || file_name.starts_with("README")
                || file_name.starts_with('.')
            {
                continue;
            }

            match load_template(path, &commands_dir, project_dir) {
                Ok(Some(template)) => all.push(template),
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(error = %e, path = %path.display(), "skipping unreadable template");
                }
            }
        }
    }

    all.sort_by(|a, b| a.name.cmp(&b.name));
    all
}

pub fn find_command<'a>(
    commands: &'a [CommandTemplate],
    name: &str,
) -> Option<&'a CommandTemplate> {
    commands.iter().find(|c| c.name == name)
}

fn load_template(
    path: &Path,
    commands_dir: &Path,
    project_dir: &Path,
) -> Result<Option<CommandTemplate>> {
    let mut content = read_to_string(path)?;
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    let name = file_name.trim_end_matches(".md").to_string();

    // A leading @include delegates the body to another file; a dangling
    // include makes the template unusable, so skip it.
    if let Some(include_path) = leading_include(&content) {
        let resolved = resolve_include(&include_path, commands_dir);
        match read_to_string(&resolved) {
            Ok(included) => content = included,
            Err(_) => return Ok(None),
        }
    }

    let description = frontmatter_description(&content).unwrap_or_else(|| name.clone());

    Ok(Some(CommandTemplate {
        prompt: format!("/{name}"),
        name,
        description,
        file_name,
        file_path: path.to_path_buf(),
        project_dir: project_dir.to_path_buf(),
        project_name: project_name(project_dir),
    }))
}

fn leading_include(content: &str) -> Option<String> {
    let first = content.lines().find(|l| !l.trim().is_empty())?;
    first
        .trim()
        .strip_prefix("@include ")
        .map(|rest| rest.trim().to_string())
}

fn resolve_include(include_path: &str, commands_dir: &Path) -> PathBuf {
    if include_path.starts_with('~') {
        return expand_tilde(include_path);
    }
    let candidate = PathBuf::from(include_path);
    if candidate.is_absolute() {
        candidate
    } else {
        commands_dir.join(candidate)
    }
}

/// `description:` value from a leading `---` YAML frontmatter block, with
/// surrounding quotes stripped.
fn frontmatter_description(content: &str) -> Option<String> {
    let re = Regex::new(r"(?s)\A---\n(.+?)\n---").expect("static regex");
    let frontmatter = re.captures(content)?.get(1)?.as_str().to_string();

    let desc_re = Regex::new(r"(?m)^description:\s*(.+)$").expect("static regex");
    let raw = desc_re.captures(&frontmatter)?.get(1)?.as_str().trim();
    Some(raw.trim_matches(|c| c == '"' || c == '\'').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SUBDIR: &str = ".agents/commands";

    fn project_with(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let commands = dir.path().join(SUBDIR);
        std::fs::create_dir_all(&commands).unwrap();
        for (name, content) in files {
            std::fs::write(commands.join(name), content).unwrap();
        }
        dir
    }

    #[test]
    fn discovers_templates_sorted_by_name() {
        let project = project_with(&[
            ("zeta.md", "Do the zeta thing."),
            ("alpha.md", "---\ndescription: First things first\n---\nBody."),
            ("README.md", "not a command"),
            ("notes.txt", "not markdown"),
        ]);

        let found = discover(&[project.path().to_path_buf()], SUBDIR);
        let names: Vec<&str> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(found[0].description, "First things first");
        assert_eq!(found[0].prompt, "/alpha");
        // No frontmatter: the name doubles as the description.
        assert_eq!(found[1].description, "zeta");
    }

    #[test]
    fn include_directive_pulls_in_the_referenced_file() {
        let project = project_with(&[
            ("shared.md", "---\ndescription: \"Shared body\"\n---\nReal content."),
            ("wrapper.md", "@include shared.md\n"),
            ("broken.md", "@include missing.md\n"),
        ]);

        let found = discover(&[project.path().to_path_buf()], SUBDIR);
        let names: Vec<&str> = found.iter().map(|c| c.name.as_str()).collect();
        // broken.md points at a missing file and is dropped.
        assert_eq!(names, vec!["shared", "wrapper"]);
        let wrapper = find_command(&found, "wrapper").unwrap();
        assert_eq!(wrapper.description, "Shared body");
    }

    #[test]
    fn invalid_project_dir_contributes_nothing() {
        let empty = tempdir().unwrap();
        assert!(!is_valid_project_dir(empty.path(), SUBDIR));
        assert!(discover(&[empty.path().to_path_buf()], SUBDIR).is_empty());
    }

    #[test]
    fn project_name_strips_hidden_dot() {
        assert_eq!(project_name(Path::new("/home/u/work/my-proj")), "my-proj");
        assert_eq!(project_name(Path::new("/home/u/.dotfiles")), "dotfiles");
    }
}

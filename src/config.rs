//! Configuration handling.
//!
//! Two documents are read here: the tool's own `.pre-commit-config.yaml`, from which
//! hook ids are pulled for interactive completion, and hookrack's optional
//! `hookrack.toml` settings file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while reading the hook configuration.
#[derive(Debug, Error)]
pub enum HookConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed hook configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Deserialize)]
struct HookDocument {
    #[serde(default)]
    repos: Vec<RepoEntry>,
}

#[derive(Debug, Deserialize)]
struct RepoEntry {
    #[serde(default)]
    hooks: Vec<HookEntry>,
}

#[derive(Debug, Deserialize)]
struct HookEntry {
    #[serde(default)]
    id: Option<serde_yaml::Value>,
}

impl HookEntry {
    /// Scalar ids are kept as text. Hooks without one are skipped.
    fn into_id(self) -> Option<String> {
        match self.id {
            Some(serde_yaml::Value::String(id)) => Some(id),
            Some(serde_yaml::Value::Number(id)) => Some(id.to_string()),
            Some(serde_yaml::Value::Bool(id)) => Some(id.to_string()),
            other => {
                debug!(id = ?other, "skipping hook without a usable id");
                None
            }
        }
    }
}

fn try_parse_hook_ids(text: &str) -> Result<Vec<String>, HookConfigError> {
    let document: HookDocument = serde_yaml::from_str(text)?;
    Ok(document
        .repos
        .into_iter()
        .flat_map(|repo| repo.hooks)
        .filter_map(HookEntry::into_id)
        .collect())
}

/// Hook ids in document order across all repos, duplicates kept.
///
/// A malformed document logs a warning and yields an empty list.
pub fn parse_hook_ids(text: &str) -> Vec<String> {
    match try_parse_hook_ids(text) {
        Ok(ids) => ids,
        Err(err) => {
            warn!(error = %err, "could not list hooks");
            Vec::new()
        }
    }
}

/// Reads and parses the hook configuration at `path`. Never fails; see [`parse_hook_ids`].
pub fn read_hook_ids(path: &Path) -> Vec<String> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(source) => {
            let err = HookConfigError::Read {
                path: path.to_path_buf(),
                source,
            };
            warn!(error = %err, "could not list hooks");
            return Vec::new();
        }
    };
    let ids = parse_hook_ids(&text);
    debug!(path = %path.display(), count = ids.len(), "listed hooks");
    ids
}

/// What to do when a run is requested while another one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Ask interactively; declines when no prompt is available.
    #[default]
    Ask,
    /// Kill the active run and start the new one.
    Kill,
    /// Keep the active run and reject the new request.
    Abort,
}

/// Top-level structure of `hookrack.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Tool executable name or path (default: `pre-commit`).
    pub executable: Option<String>,
    /// Hook configuration file name at the project root.
    pub config_file: Option<String>,
    /// Extra arguments appended to every hook run, shell-quoted.
    pub args: Option<String>,
    /// Raise the output pane when a run fails (default: true).
    pub raise_on_failure: Option<bool>,
    /// Conflict policy when a run is already active.
    pub on_conflict: Option<ConflictPolicy>,
    /// Regex overriding the failed-hook report line.
    pub failure_pattern: Option<String>,
    /// Whether to use Unicode symbols in the TUI (default: true).
    pub symbols: Option<bool>,
    /// Where the TUI writes its log.
    pub log_file: Option<PathBuf>,
}

/// Loads and parses the settings file.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOOKS: &str = r#"
repos:
  - repo: https://github.com/pre-commit/pre-commit-hooks
    rev: v4.5.0
    hooks:
      - id: check-yaml
      - id: end-of-file-fixer
  - repo: https://github.com/psf/black
    rev: 24.1.0
    hooks:
      - id: black
        args: [--quiet]
  - repo: local
    hooks:
      - id: check-yaml
        name: second yaml check
        entry: yamllint
        language: system
"#;

    #[test]
    fn hook_ids_keep_document_order_and_duplicates() {
        assert_eq!(
            parse_hook_ids(HOOKS),
            vec!["check-yaml", "end-of-file-fixer", "black", "check-yaml"]
        );
    }

    #[test]
    fn repos_without_hooks_are_skipped() {
        let text = "repos:\n  - repo: meta\n  - repo: local\n    hooks: []\n";
        assert!(parse_hook_ids(text).is_empty());
    }

    #[test]
    fn malformed_documents_yield_empty() {
        assert!(parse_hook_ids("repos: [unclosed").is_empty());
        assert!(parse_hook_ids("repos:\n  - hooks:\n      - name: no id\n").is_empty());
        assert!(parse_hook_ids("- just\n- a list\n").is_empty());
        assert!(parse_hook_ids("").is_empty());
    }

    #[test]
    fn hooks_without_usable_ids_do_not_hide_the_rest() {
        let text = "repos:\n  - repo: local\n    hooks:\n      - id: black\n      - name: unnamed\n      - id: 123\n      - id: [a, b]\n      - id: flake8\n";
        assert_eq!(parse_hook_ids(text), vec!["black", "123", "flake8"]);
    }

    #[test]
    fn missing_file_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_hook_ids(&dir.path().join(".pre-commit-config.yaml")).is_empty());
    }

    #[test]
    fn edits_are_picked_up_on_next_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".pre-commit-config.yaml");
        std::fs::write(&path, "repos:\n  - repo: local\n    hooks:\n      - id: a\n").unwrap();
        assert_eq!(read_hook_ids(&path), vec!["a"]);
        std::fs::write(&path, HOOKS).unwrap();
        assert_eq!(read_hook_ids(&path).len(), 4);
    }

    #[test]
    fn parses_settings() {
        let raw = r#"
executable = "/opt/bin/pre-commit"
config_file = ".pre-commit-config.yml"
args = "--hook-stage manual"
raise_on_failure = false
on_conflict = "kill"
failure_pattern = '^(\S+)\.+Failed$'
symbols = false
log_file = "hookrack.log"
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.executable.as_deref(), Some("/opt/bin/pre-commit"));
        assert_eq!(config.config_file.as_deref(), Some(".pre-commit-config.yml"));
        assert_eq!(config.args.as_deref(), Some("--hook-stage manual"));
        assert_eq!(config.raise_on_failure, Some(false));
        assert_eq!(config.on_conflict, Some(ConflictPolicy::Kill));
        assert_eq!(config.failure_pattern.as_deref(), Some(r"^(\S+)\.+Failed$"));
        assert_eq!(config.symbols, Some(false));
        assert_eq!(config.log_file, Some(PathBuf::from("hookrack.log")));
    }

    #[test]
    fn empty_settings_are_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.executable.is_none());
        assert!(config.on_conflict.is_none());
    }
}

//! Collaborators supplied by the embedding.
//!
//! The supervisor does not know where the project lives, how to ask the user a
//! question or who is watching its state. It asks a [`Host`] instead. Two hosts ship
//! with hookrack: [`ConsoleHost`] for headless commands and [`TuiHost`] for the
//! interactive view.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::ConflictPolicy;
use crate::supervisor::RunKind;

/// A user-facing outcome the host should surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Succeeded,
    Failed { failed_hooks: usize, raise: bool },
    Killed,
    Maintenance { kind: RunKind, success: bool },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Succeeded => f.write_str("all hooks passed"),
            Notice::Failed { failed_hooks: 0, .. } => f.write_str("hook run failed"),
            Notice::Failed { failed_hooks: 1, .. } => f.write_str("1 hook failed"),
            Notice::Failed { failed_hooks, .. } => write!(f, "{} hooks failed", failed_hooks),
            Notice::Killed => f.write_str("hook run killed"),
            Notice::Maintenance { kind, success: true } => write!(f, "{} finished", kind),
            Notice::Maintenance { kind, success: false } => write!(f, "{} failed", kind),
        }
    }
}

pub trait Host {
    /// Directory the tool runs in. `None` falls back to the current directory.
    fn project_root(&self) -> Option<PathBuf>;
    /// The tool's configuration file under `root`, if it exists.
    fn config_file(&self, root: &Path) -> Option<PathBuf>;
    /// PATH-style lookup of the tool executable.
    fn executable_resolvable(&self, name: &str) -> bool;
    /// Run state changed; observers should pull a fresh snapshot.
    fn status_changed(&mut self);
    /// "A run is active, kill it?" Returning `false` aborts the new request.
    fn confirm(&mut self, message: &str) -> bool;
    fn notify(&mut self, notice: Notice);
}

/// Filesystem and PATH lookups shared by the bundled hosts.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    start_dir: PathBuf,
    config_name: String,
}

impl SystemProbe {
    pub fn new(start_dir: PathBuf, config_name: impl Into<String>) -> Self {
        Self {
            start_dir,
            config_name: config_name.into(),
        }
    }

    /// Nearest ancestor of the start directory that holds a `.git` entry.
    pub fn project_root(&self) -> Option<PathBuf> {
        self.start_dir
            .ancestors()
            .find(|dir| dir.join(".git").exists())
            .map(Path::to_path_buf)
    }

    pub fn config_file(&self, root: &Path) -> Option<PathBuf> {
        let path = root.join(&self.config_name);
        path.is_file().then_some(path)
    }

    pub fn executable_resolvable(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }
}

/// Host for one-shot terminal commands: notices go to stderr, conflicts follow the policy.
#[derive(Debug)]
pub struct ConsoleHost {
    probe: SystemProbe,
    policy: ConflictPolicy,
}

impl ConsoleHost {
    pub fn new(probe: SystemProbe, policy: ConflictPolicy) -> Self {
        Self { probe, policy }
    }
}

impl Host for ConsoleHost {
    fn project_root(&self) -> Option<PathBuf> {
        self.probe.project_root()
    }

    fn config_file(&self, root: &Path) -> Option<PathBuf> {
        self.probe.config_file(root)
    }

    fn executable_resolvable(&self, name: &str) -> bool {
        self.probe.executable_resolvable(name)
    }

    fn status_changed(&mut self) {
        debug!("run state changed");
    }

    fn confirm(&mut self, message: &str) -> bool {
        let answer = self.policy == ConflictPolicy::Kill;
        info!(%message, answer, "conflict resolved by policy");
        answer
    }

    fn notify(&mut self, notice: Notice) {
        eprintln!("hookrack: {}", notice);
    }
}

/// Host backing the TUI. Notices queue up until the app drains them, and the
/// kill-and-restart question is answered by a modal before `start` is called.
#[derive(Debug)]
pub struct TuiHost {
    probe: SystemProbe,
    policy: ConflictPolicy,
    answer: Option<bool>,
    notices: Vec<Notice>,
    changed: bool,
}

impl TuiHost {
    pub fn new(probe: SystemProbe, policy: ConflictPolicy) -> Self {
        Self {
            probe,
            policy,
            answer: None,
            notices: Vec::new(),
            changed: false,
        }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Pre-answers the next confirmation, as chosen in the modal.
    pub fn answer_next(&mut self, answer: bool) {
        self.answer = Some(answer);
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Returns whether state changed since the last call.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}

impl Host for TuiHost {
    fn project_root(&self) -> Option<PathBuf> {
        self.probe.project_root()
    }

    fn config_file(&self, root: &Path) -> Option<PathBuf> {
        self.probe.config_file(root)
    }

    fn executable_resolvable(&self, name: &str) -> bool {
        self.probe.executable_resolvable(name)
    }

    fn status_changed(&mut self) {
        self.changed = true;
    }

    fn confirm(&mut self, message: &str) -> bool {
        let answer = match self.policy {
            ConflictPolicy::Kill => true,
            ConflictPolicy::Abort => false,
            ConflictPolicy::Ask => self.answer.take().unwrap_or(false),
        };
        debug!(%message, answer, "conflict confirmation");
        answer
    }

    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_root_is_nearest_git_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();

        let probe = SystemProbe::new(nested, ".pre-commit-config.yaml");
        assert_eq!(probe.project_root().as_deref(), Some(dir.path()));
    }

    #[test]
    fn config_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let probe = SystemProbe::new(dir.path().to_path_buf(), ".pre-commit-config.yaml");
        assert!(probe.config_file(dir.path()).is_none());
        std::fs::write(dir.path().join(".pre-commit-config.yaml"), "repos: []\n").unwrap();
        assert!(probe.config_file(dir.path()).is_some());
    }

    #[test]
    fn tui_host_answers_once_then_declines() {
        let probe = SystemProbe::new(PathBuf::from("."), ".pre-commit-config.yaml");
        let mut host = TuiHost::new(probe, ConflictPolicy::Ask);
        host.answer_next(true);
        assert!(host.confirm("kill?"));
        assert!(!host.confirm("kill?"));
    }

    #[test]
    fn notices_read_naturally() {
        assert_eq!(
            Notice::Failed { failed_hooks: 2, raise: true }.to_string(),
            "2 hooks failed"
        );
        assert_eq!(
            Notice::Maintenance { kind: RunKind::Install, success: true }.to_string(),
            "install finished"
        );
    }
}

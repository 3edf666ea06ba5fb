//! Run state exposed to the status view.
//!
//! `RunState` mirrors the supervisor's active slot for display. It is never consulted
//! for concurrency decisions; the supervisor's own handle is the source of truth.

use std::fmt;

/// Outcome of the most recent hook run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunStatus {
    /// Nothing has run yet, or the last run was killed.
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Status plus the hooks that failed. `failed_hooks` is only non-empty while `Failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    status: RunStatus,
    failed_hooks: Vec<String>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn failed_hooks(&self) -> &[String] {
        &self.failed_hooks
    }

    pub fn begin_run(&mut self) {
        self.status = RunStatus::Running;
        self.failed_hooks.clear();
    }

    pub fn succeed(&mut self) {
        self.status = RunStatus::Succeeded;
        self.failed_hooks.clear();
    }

    pub fn fail(&mut self, failed_hooks: Vec<String>) {
        self.status = RunStatus::Failed;
        self.failed_hooks = failed_hooks;
    }

    /// Back to `Idle`, used after an explicit kill.
    pub fn reset(&mut self) {
        self.status = RunStatus::Idle;
        self.failed_hooks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_hooks_only_survive_while_failed() {
        let mut state = RunState::new();
        assert_eq!(state.status(), RunStatus::Idle);

        state.fail(vec!["black".into()]);
        assert_eq!(state.failed_hooks(), ["black".to_string()]);

        state.begin_run();
        assert_eq!(state.status(), RunStatus::Running);
        assert!(state.failed_hooks().is_empty());

        state.fail(vec!["flake8".into()]);
        state.succeed();
        assert!(state.failed_hooks().is_empty());

        state.fail(vec!["flake8".into()]);
        state.reset();
        assert_eq!(state, RunState::new());
    }

    #[test]
    fn status_labels() {
        assert_eq!(RunStatus::Succeeded.to_string(), "succeeded");
        assert_eq!(RunStatus::Idle.to_string(), "idle");
    }
}

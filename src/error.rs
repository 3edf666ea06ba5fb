//! Errors surfaced by the supervisor to its callers.

use thiserror::Error;

/// Lifecycle failures. Parsing and classification problems never show up here; they
/// degrade to empty results inside their own modules.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The tool or its configuration cannot be found.
    #[error("hooks unavailable: {reason}")]
    Unavailable { reason: String },
    /// A run is active and the caller chose not to replace it.
    #[error("a hook run is already active")]
    Conflict,
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("no hook run to kill")]
    NoActiveProcess,
}

//! Typed error taxonomy for the migration engine.
//!
//! Every variant here corresponds to one row of the engine's error table.
//! All of them are fatal to the current `migrate()` run — there is no
//! local recovery; the in-progress guard key is the sole recovery
//! mechanism and its persistence across failed runs is load-bearing (see
//! [`crate::orchestrator`]).

use crate::version::Version;
use thiserror::Error;

/// Errors raised by the migration engine.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The underlying key-value store failed an I/O operation.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The stored schema version predates what this binary can migrate
    /// from.
    #[error("Migration from versions < {min} is not supported. Your version: {from}")]
    UnsupportedVersion { min: Version, from: Version },

    /// An explicit legacy-refusal step fired.
    #[error("{0}")]
    UnsupportedLegacy(String),

    /// The in-progress guard key was already present at the start of a run.
    #[error("A migration is already in progress (or a previous one crashed). Remove the '{guard_key}' key manually before retrying.")]
    MigrationAlreadyInProgress { guard_key: String },

    /// A version record's bytes could not be parsed.
    #[error("corrupt version record: malformed length-prefixed payload ({len} bytes)")]
    CorruptVersion { len: usize },

    /// A legacy task record failed to decode during the 0.13.0 rekey step.
    #[error("corrupt legacy task record at key {0:?}")]
    CorruptLegacyTask(String),

    /// A step failed; wraps the target version and the underlying cause.
    #[error("migration to {target} failed: {cause}")]
    MigrationFailed { target: Version, cause: String },

    /// The build metadata's version string could not be parsed.
    #[error("build version string {build_string:?} does not match ^\\d+\\.\\d+\\.\\d+")]
    BadBuildVersion { build_string: String },

    /// The configured state/backup prefixes violate the disjointness
    /// requirement. Fires before any migration attempt is made.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MigrationError {
    /// Wraps an arbitrary failure raised while executing a step into
    /// [`MigrationError::MigrationFailed`], matching the propagation
    /// policy: non-typed throwables from inside a step are wrapped rather
    /// than surfaced directly.
    pub fn step_failed(target: Version, cause: impl std::fmt::Display) -> Self {
        MigrationError::MigrationFailed { target, cause: cause.to_string() }
    }
}

impl From<anyhow::Error> for MigrationError {
    fn from(cause: anyhow::Error) -> Self {
        MigrationError::MigrationFailed { target: Version::empty(), cause: cause.to_string() }
    }
}

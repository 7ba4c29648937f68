//! Configuration inputs for the migration engine.
//!
//! A plain struct with validation rather than a builder, scoped down to
//! the two inputs this engine actually needs: where live state lives,
//! and where backups go.

use crate::error::MigrationError;

/// The engine's only required configuration: the state and backup key
/// prefixes in the host's KVS.
///
/// Both prefixes must be disjoint, and neither may be a prefix of the
/// other — otherwise a backup write could shadow live state or vice
/// versa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Prefix under which live application/group/task state lives,
    /// e.g. `/marathon/state`.
    pub state_prefix: String,
    /// Prefix under which version-qualified backup snapshots are
    /// written, e.g. `/marathon/backup`.
    pub backup_prefix: String,
}

impl EngineConfig {
    pub fn new(state_prefix: impl Into<String>, backup_prefix: impl Into<String>) -> Result<Self, MigrationError> {
        let config = Self { state_prefix: state_prefix.into(), backup_prefix: backup_prefix.into() };
        config.validate()?;
        Ok(config)
    }

    /// Checks the disjointness requirement described on [`EngineConfig`].
    pub fn validate(&self) -> Result<(), MigrationError> {
        if self.state_prefix.is_empty() || self.backup_prefix.is_empty() {
            return Err(MigrationError::InvalidConfig("state_prefix and backup_prefix must be non-empty".into()));
        }
        if self.state_prefix == self.backup_prefix {
            return Err(MigrationError::InvalidConfig("state_prefix and backup_prefix must be disjoint".into()));
        }
        if self.state_prefix.starts_with(&self.backup_prefix) || self.backup_prefix.starts_with(&self.state_prefix) {
            return Err(MigrationError::InvalidConfig("state_prefix and backup_prefix may not prefix one another".into()));
        }
        Ok(())
    }
}

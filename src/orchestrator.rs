//! Top-level migration flow.
//!
//! Drives the state machine described on [`MigrationEngine::migrate`]:
//! initialize the store, acquire an in-progress guard, back up or restore
//! live state, apply outstanding steps in order, commit the new version,
//! and release the guard. Every transition is a suspension point; the
//! whole thing is a linear sequence of awaited calls, not a callback
//! chain.

use crate::backup;
use crate::collaborators::{AppRepository, GroupRepository};
use crate::config::EngineConfig;
use crate::error::MigrationError;
use crate::kvs::{KeyValueStore, ManagedStore};
use crate::registry::{self, StepContext};
use crate::version::Version;
use std::sync::Arc;
use tracing::warn;

/// Holds the serialized current schema version.
const VERSION_KEY: &str = "internal:storage:version";
/// Existence is the lease: present iff a migration is running or crashed
/// mid-flight.
const GUARD_KEY: &str = "internal:storage:migrationInProgress";

/// Orchestrates a single schema migration run against a host-supplied
/// key-value store and its application/group collaborators.
pub struct MigrationEngine {
    kvs: Arc<dyn KeyValueStore>,
    managed: Option<Arc<dyn ManagedStore>>,
    apps: Arc<dyn AppRepository>,
    groups: Arc<dyn GroupRepository>,
    config: EngineConfig,
    current: Version,
}

impl MigrationEngine {
    /// Builds an engine against a store with no management capability.
    /// `initialize()` is never called.
    pub fn new(kvs: Arc<dyn KeyValueStore>, apps: Arc<dyn AppRepository>, groups: Arc<dyn GroupRepository>, config: EngineConfig, current: Version) -> Self {
        Self { kvs, managed: None, apps, groups, config, current }
    }

    /// Builds an engine against a store that also advertises
    /// [`ManagedStore`]; its `initialize()` is called during the `INIT`
    /// phase of [`Self::migrate`].
    pub fn with_managed_store<K>(kvs: Arc<K>, apps: Arc<dyn AppRepository>, groups: Arc<dyn GroupRepository>, config: EngineConfig, current: Version) -> Self
    where
        K: ManagedStore + 'static,
    {
        let managed: Arc<dyn ManagedStore> = kvs.clone();
        let kvs: Arc<dyn KeyValueStore> = kvs;
        Self { kvs, managed: Some(managed), apps, groups, config, current }
    }

    /// Runs the full migration flow and returns the committed version.
    ///
    /// The stored version is read and checked against the minimum
    /// supported version before the in-progress guard is taken, so an
    /// `UnsupportedVersion` rejection never leaves a guard key behind.
    /// Every failure from guard acquisition onward leaves the guard key in
    /// place, so the next run detects the aborted migration and enters
    /// restore mode.
    #[tracing::instrument(skip(self), fields(state_prefix = %self.config.state_prefix, current = %self.current))]
    pub async fn migrate(&self) -> Result<Version, MigrationError> {
        self.init().await?;

        let from = self.current_storage_version().await?;
        registry::check_minimum_supported(from)?;

        self.acquire_guard().await?;

        match self.run_migration(from).await {
            Ok(()) => {
                self.release_guard().await?;
                tracing::info!(committed = %self.current, "migration complete");
                Ok(self.current)
            }
            Err(err) => {
                tracing::warn!(%err, "migration failed; guard left in place");
                Err(err)
            }
        }
    }

    async fn run_migration(&self, from: Version) -> Result<(), MigrationError> {
        self.backup_or_restore(from).await?;
        self.apply_migration_steps(from).await?;
        self.commit().await?;
        Ok(())
    }

    /// Returns the persisted schema version, or the binary's `current`
    /// version if none has ever been stored. Read-only; safe to call
    /// before [`Self::migrate`].
    #[tracing::instrument(skip(self))]
    pub async fn current_storage_version(&self) -> Result<Version, MigrationError> {
        match self.kvs.load(VERSION_KEY).await? {
            Some(entity) => Version::parse(&entity.bytes),
            None => Ok(self.current),
        }
    }

    /// Applies every step whose target version is strictly greater than
    /// `from`, in ascending order, and returns the ordered list of target
    /// versions actually applied. Exposed directly for testing.
    ///
    /// Rejects `from` below [`registry::MIN_SUPPORTED_STORAGE_VERSION`]
    /// with `UnsupportedVersion`, the same check `migrate()` performs
    /// before taking the in-progress guard — called again here so this
    /// method is self-contained for a caller that invokes it directly.
    #[tracing::instrument(skip(self))]
    pub async fn apply_migration_steps(&self, from: Version) -> Result<Vec<Version>, MigrationError> {
        registry::check_minimum_supported(from)?;

        let registry = registry::build_registry();
        let steps = registry::applicable_steps(&registry, from);

        let ctx = StepContext { kvs: self.kvs.as_ref(), apps: self.apps.as_ref(), groups: self.groups.as_ref(), state_prefix: &self.config.state_prefix };

        let mut applied = Vec::with_capacity(steps.len());
        for step in steps {
            tracing::info!(target = %step.target_version(), "applying migration step");
            step.apply(&ctx).await?;
            applied.push(step.target_version());
        }
        Ok(applied)
    }

    #[tracing::instrument(skip(self))]
    async fn init(&self) -> Result<(), MigrationError> {
        if let Some(managed) = &self.managed {
            managed.initialize().await?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn acquire_guard(&self) -> Result<(), MigrationError> {
        if self.kvs.load(GUARD_KEY).await?.is_some() {
            return Err(MigrationError::MigrationAlreadyInProgress { guard_key: GUARD_KEY.to_string() });
        }
        self.kvs.create(GUARD_KEY, Vec::new()).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn release_guard(&self) -> Result<(), MigrationError> {
        if !self.kvs.delete(GUARD_KEY).await? {
            warn!("guard key already absent at release");
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn backup_or_restore(&self, from: Version) -> Result<(), MigrationError> {
        backup::backup_or_restore(self.kvs.as_ref(), &self.config.state_prefix, &self.config.backup_prefix, from).await
    }

    #[tracing::instrument(skip(self))]
    async fn commit(&self) -> Result<(), MigrationError> {
        let bytes = self.current.serialize();
        match self.kvs.load(VERSION_KEY).await? {
            Some(mut existing) => {
                existing.bytes = bytes;
                self.kvs.update(existing).await?;
            }
            None => {
                self.kvs.create(VERSION_KEY, bytes).await?;
            }
        }
        Ok(())
    }
}

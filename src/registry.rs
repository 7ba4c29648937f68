//! Migration registry.
//!
//! A statically-declared, ordered, append-only list of migration steps.
//! Adding a migration means appending a new [`Step`] with a strictly
//! greater target version than every existing entry — older entries are
//! never modified or reordered.

use crate::collaborators::{AppRepository, GroupRepository};
use crate::error::MigrationError;
use crate::kvs::KeyValueStore;
use crate::steps;
use crate::version::Version;
use async_trait::async_trait;

/// The lowest stored schema version this binary can migrate from. A
/// non-empty `from` below this fails fast with `UnsupportedVersion`
/// before any guard key is taken.
pub const MIN_SUPPORTED_STORAGE_VERSION: Version = Version::new(0, 3, 0);

/// Read-only handles a step needs to do its work. Steps borrow these for
/// the duration of a single `apply` call; nothing here outlives the
/// orchestrator's `APPLY` phase.
pub struct StepContext<'a> {
    pub kvs: &'a dyn KeyValueStore,
    pub apps: &'a dyn AppRepository,
    pub groups: &'a dyn GroupRepository,
    pub state_prefix: &'a str,
}

/// A single versioned transformation over persisted state.
#[async_trait]
pub trait Step: Send + Sync {
    /// The schema version this step brings the store to.
    fn target_version(&self) -> Version;

    /// Applies the transformation. Any failure is wrapped by the caller
    /// into `MigrationError::MigrationFailed(target_version(), cause)`.
    async fn apply(&self, ctx: &StepContext<'_>) -> Result<(), MigrationError>;
}

/// Builds the compiled-in, ascending-order list of migration steps.
///
/// This is the single place new migrations are appended. The ascending
/// order and absence of duplicate target versions are enforced by
/// [`applicable_steps`] in debug builds.
pub fn build_registry() -> Vec<Box<dyn Step>> {
    vec![
        Box::new(steps::legacy_refuse::LegacyRefuseStep::new(Version::new(0, 7, 0))),
        Box::new(steps::add_version_info::AddVersionInfoStep::new(Version::new(0, 11, 0))),
        Box::new(steps::rekey_tasks::RekeyTasksStep::new(Version::new(0, 13, 0))),
    ]
}

/// Returns every registered step whose target version is strictly
/// greater than `from`, sorted ascending by target version.
///
/// An empty `from` (the sentinel, meaning "no stored version yet")
/// applies no minimum-version check; every step in the registry is
/// considered applicable.
pub fn applicable_steps(registry: &[Box<dyn Step>], from: Version) -> Vec<&dyn Step> {
    debug_assert!(is_strictly_ascending_with_no_duplicates(registry), "registry must be strictly ascending with no duplicate target versions");

    let mut steps: Vec<&dyn Step> = registry.iter().filter(|step| step.target_version() > from).map(|step| step.as_ref()).collect();
    steps.sort_by_key(|step| step.target_version());
    steps
}

fn is_strictly_ascending_with_no_duplicates(registry: &[Box<dyn Step>]) -> bool {
    registry.windows(2).all(|pair| pair[0].target_version() < pair[1].target_version())
}

/// Fails fast with `UnsupportedVersion` if `from` is non-empty and below
/// [`MIN_SUPPORTED_STORAGE_VERSION`]. An empty `from` never fails this
/// check.
pub fn check_minimum_supported(from: Version) -> Result<(), MigrationError> {
    if !from.is_empty() && from < MIN_SUPPORTED_STORAGE_VERSION {
        return Err(MigrationError::UnsupportedVersion { min: MIN_SUPPORTED_STORAGE_VERSION, from });
    }
    Ok(())
}

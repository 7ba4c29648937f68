//! End-to-end coverage of the migration engine driven entirely through its
//! public API, the way a hosting scheduler would use it.

use statestore_migrate::collaborators::test_doubles::{InMemoryAppRepository, InMemoryGroupRepository};
use statestore_migrate::config::EngineConfig;
use statestore_migrate::error::MigrationError;
use statestore_migrate::kvs::memory::InMemoryKvs;
use statestore_migrate::kvs::KeyValueStore;
use statestore_migrate::orchestrator::MigrationEngine;
use statestore_migrate::registry;
use statestore_migrate::version::Version;
use std::sync::Arc;

const STATE: &str = "/marathon/state";
const BACKUP: &str = "/marathon/backup";
const VERSION_KEY: &str = "internal:storage:version";

fn build(kvs: Arc<InMemoryKvs>, current: Version) -> MigrationEngine {
    let apps = Arc::new(InMemoryAppRepository::new());
    let groups = Arc::new(InMemoryGroupRepository::new());
    let config = EngineConfig::new(STATE, BACKUP).expect("disjoint prefixes");
    MigrationEngine::with_managed_store(kvs, apps, groups, config, current)
}

#[tokio::test]
async fn filter_by_version_matches_documented_scenarios() {
    let reg = registry::build_registry();

    let all = registry::applicable_steps(&reg, Version::empty());
    assert_eq!(all.iter().map(|s| s.target_version()).collect::<Vec<_>>(), vec![Version::new(0, 7, 0), Version::new(0, 11, 0), Version::new(0, 13, 0)]);

    let none = registry::applicable_steps(&reg, Version::new(u32::MAX, 0, 0));
    assert!(none.is_empty());

    let from_0_10 = registry::applicable_steps(&reg, Version::new(0, 10, 0));
    assert_eq!(from_0_10.iter().map(|s| s.target_version()).collect::<Vec<_>>(), vec![Version::new(0, 11, 0), Version::new(0, 13, 0)]);
}

#[tokio::test]
async fn a_second_migration_run_is_a_clean_no_op() {
    let kvs = Arc::new(InMemoryKvs::new());
    let current = Version::new(0, 16, 0);

    let first = build(kvs.clone(), current).migrate().await.unwrap();
    assert_eq!(first, current);

    // Re-running against an already-migrated store applies zero steps and
    // simply re-commits the same version.
    let second = build(kvs.clone(), current).migrate().await.unwrap();
    assert_eq!(second, current);

    let stored = Version::parse(&kvs.load(VERSION_KEY).await.unwrap().unwrap().bytes).unwrap();
    assert_eq!(stored, current);
}

#[tokio::test]
async fn crashed_migration_leaves_guard_for_next_run_to_find() {
    let kvs = Arc::new(InMemoryKvs::new());
    kvs.seed("internal:storage:migrationInProgress", Vec::new());

    let err = build(kvs.clone(), Version::new(0, 16, 0)).migrate().await.unwrap_err();
    assert!(matches!(err, MigrationError::MigrationAlreadyInProgress { .. }));

    // The guard is exactly what a prior crashed run would have left; an
    // operator removing it manually is the documented recovery path.
    assert!(kvs.delete("internal:storage:migrationInProgress").await.unwrap());
    let recovered = build(kvs.clone(), Version::new(0, 16, 0)).migrate().await.unwrap();
    assert_eq!(recovered, Version::new(0, 16, 0));
}

#[tokio::test]
async fn legacy_storage_below_minimum_is_rejected_before_any_step_runs() {
    let kvs = Arc::new(InMemoryKvs::new());
    kvs.seed(VERSION_KEY, Version::new(0, 1, 0).serialize());

    let err = build(kvs.clone(), Version::new(0, 16, 0)).migrate().await.unwrap_err();
    assert!(matches!(err, MigrationError::UnsupportedVersion { .. }));
    // Nothing under the state prefix was touched.
    assert!(kvs.enumerate().await.unwrap().iter().all(|id| id == VERSION_KEY));
}

#[tokio::test]
async fn engine_config_rejects_overlapping_prefixes() {
    assert!(EngineConfig::new("/marathon/state", "/marathon/state/backup").is_err());
}

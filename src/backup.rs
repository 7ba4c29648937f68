//! Backup manager.
//!
//! Decides, at the start of a migration and before any step runs, whether
//! to snapshot live state under a version-qualified backup prefix ("store
//! mode") or to restore state from a backup left behind by a migration
//! that crashed mid-flight ("restore mode").
//!
//! The decision is made by inspecting a single representative key rather
//! than scanning the whole backup prefix up front — see the discussion in
//! `crate::orchestrator` docs for why that shortcut is safe here.

use crate::error::MigrationError;
use crate::kvs::KeyValueStore;
use crate::version::Version;
use tracing::warn;

/// Builds the backup prefix for a given schema version:
/// `backup_prefix + "_" + major.minor.patch`.
pub fn backup_path(backup_prefix: &str, version: Version) -> String {
    format!("{backup_prefix}_{}.{}.{}", version.major, version.minor, version.patch)
}

/// Maps a live state id to its backup counterpart for `version`, by
/// replacing the literal `state_prefix` with `backup_path(version)`.
fn to_backup_id(id: &str, state_prefix: &str, backup_prefix: &str, version: Version) -> String {
    format!("{}{}", backup_path(backup_prefix, version), &id[state_prefix.len()..])
}

/// Maps a backup id back to its live state counterpart, by replacing
/// `backup_path(version)` with `state_prefix`.
fn to_state_id(id: &str, state_prefix: &str, backup_prefix: &str, version: Version) -> String {
    let prefix = backup_path(backup_prefix, version);
    format!("{state_prefix}{}", &id[prefix.len()..])
}

/// Runs the backup/restore decision procedure: snapshot live state if no
/// backup from this generation exists yet, otherwise restore from it.
///
/// `from` is the schema version that was stored at the start of this run
/// (or the empty sentinel on a first-ever start); it names the backup
/// generation to create or look for.
pub async fn backup_or_restore(kvs: &dyn KeyValueStore, state_prefix: &str, backup_prefix: &str, from: Version) -> Result<(), MigrationError> {
    let ids = kvs.enumerate().await?;
    if ids.is_empty() {
        return Ok(());
    }

    let Some(k0) = ids.iter().find(|id| id.starts_with(state_prefix)) else {
        // No live state under the configured prefix: nothing to back up.
        return Ok(());
    };

    let b0_id = to_backup_id(k0, state_prefix, backup_prefix, from);
    let prior_backup_exists = kvs.load(&b0_id).await?.is_some();

    if prior_backup_exists {
        restore(kvs, &ids, state_prefix, backup_prefix, from).await
    } else {
        store(kvs, &ids, state_prefix, backup_prefix, from).await
    }
}

/// Copies every live state key to a version-qualified backup key.
async fn store(kvs: &dyn KeyValueStore, ids: &[String], state_prefix: &str, backup_prefix: &str, from: Version) -> Result<(), MigrationError> {
    for id in ids.iter().filter(|id| id.starts_with(state_prefix)) {
        let bytes = match kvs.load(id).await? {
            Some(entity) => entity.bytes,
            None => {
                // The live key vanished between enumeration and load (a
                // race with some concurrent deletion). The set-equality
                // invariant still requires a backup entry to exist.
                warn!(key = %id, "live key vanished before backup; writing empty backup entry");
                Vec::new()
            }
        };
        let backup_id = to_backup_id(id, state_prefix, backup_prefix, from);
        kvs.create(&backup_id, bytes).await?;
    }
    Ok(())
}

/// Discards live state and replaces it with the contents of the backup
/// generation for `from`.
async fn restore(kvs: &dyn KeyValueStore, ids: &[String], state_prefix: &str, backup_prefix: &str, from: Version) -> Result<(), MigrationError> {
    for id in ids.iter().filter(|id| id.starts_with(state_prefix)) {
        kvs.delete(id).await?;
    }

    let backup_gen = backup_path(backup_prefix, from);
    for id in ids.iter().filter(|id| id.starts_with(&backup_gen)) {
        let bytes = match kvs.load(id).await? {
            Some(entity) => entity.bytes,
            None => {
                warn!(key = %id, "backup key vanished before restore; writing empty state entry");
                Vec::new()
            }
        };
        let state_id = to_state_id(id, state_prefix, backup_prefix, from);
        kvs.create(&state_id, bytes).await?;
    }
    Ok(())
}

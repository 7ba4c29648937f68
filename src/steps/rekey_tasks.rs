//! Step → (0.13.0) "RekeyTasks and RenameFrameworkId".
//!
//! Two unrelated cleanups bundled into one schema bump:
//!
//! - **RekeyTasks**: legacy task keys were stored as `<appId>:<taskId>`,
//!   with the instance id embedded as a dotted suffix of `taskId`. This
//!   rewrites them to the flat `task:<taskId>` shape, dropping the
//!   intermediate app id segment, and decodes/re-encodes the
//!   length-prefixed legacy record on the way.
//! - **RenameFrameworkId**: the framework id key gets a namespaced name.

use crate::error::MigrationError;
use crate::registry::{Step, StepContext};
use crate::version::Version;
use async_trait::async_trait;
use byteorder::{BigEndian, ByteOrder};

/// The renamed key `RenameFrameworkId` writes to.
const FRAMEWORK_ID_KEY: &str = "framework:id";
/// The legacy key `RenameFrameworkId` reads from and removes.
const LEGACY_FRAMEWORK_ID_KEY: &str = "frameworkId";

pub struct RekeyTasksStep {
    target: Version,
}

impl RekeyTasksStep {
    pub fn new(target: Version) -> Self {
        Self { target }
    }
}

#[async_trait]
impl Step for RekeyTasksStep {
    fn target_version(&self) -> Version {
        self.target
    }

    async fn apply(&self, ctx: &StepContext<'_>) -> Result<(), MigrationError> {
        rekey_tasks(ctx).await?;
        rename_framework_id(ctx).await?;
        Ok(())
    }
}

async fn rekey_tasks(ctx: &StepContext<'_>) -> Result<(), MigrationError> {
    let ids = ctx.kvs.enumerate().await?;

    let mut legacy_ids: Vec<String> = ids
        .into_iter()
        .filter(|id| id.starts_with(ctx.state_prefix) && is_legacy_task_key(&id[ctx.state_prefix.len()..]))
        .collect();
    // Deterministic, strictly sequential processing — no concurrent rewrites.
    legacy_ids.sort();

    for legacy_id in legacy_ids {
        let entity = ctx.kvs.load(&legacy_id).await?;
        let bytes = entity.map(|e| e.bytes).unwrap_or_default();

        let record = decode_legacy_record(&bytes).ok_or_else(|| MigrationError::CorruptLegacyTask(legacy_id.clone()))?;

        let suffix = &legacy_id[ctx.state_prefix.len()..];
        let task_id = extract_task_id(suffix).ok_or_else(|| MigrationError::CorruptLegacyTask(legacy_id.clone()))?;

        let new_id = format!("{}/task:{task_id}", ctx.state_prefix);
        ctx.kvs.create(&new_id, record).await?;
        ctx.kvs.delete(&legacy_id).await?;
    }

    Ok(())
}

async fn rename_framework_id(ctx: &StepContext<'_>) -> Result<(), MigrationError> {
    if ctx.kvs.load(FRAMEWORK_ID_KEY).await?.is_some() {
        return Ok(());
    }

    if let Some(legacy) = ctx.kvs.load(LEGACY_FRAMEWORK_ID_KEY).await? {
        ctx.kvs.create(FRAMEWORK_ID_KEY, legacy.bytes).await?;
        ctx.kvs.delete(LEGACY_FRAMEWORK_ID_KEY).await?;
    }

    Ok(())
}

/// True iff `key` matches the legacy `^.*:.*\..*$` pattern: a colon
/// somewhere in the key, followed later by a dot.
fn is_legacy_task_key(key: &str) -> bool {
    last_colon_with_dot_after(key).is_some()
}

/// Position of the rightmost colon after which a dot still occurs,
/// mirroring the greedy `.*:` of the source regex.
fn last_colon_with_dot_after(key: &str) -> Option<usize> {
    let colon_idx = key.rfind(':')?;
    if key[colon_idx + 1..].contains('.') {
        Some(colon_idx)
    } else {
        None
    }
}

/// Extracts the task id from a legacy `<appId>:<taskId>` suffix — the
/// part after the rightmost matching colon.
fn extract_task_id(suffix: &str) -> Option<String> {
    let colon_idx = last_colon_with_dot_after(suffix)?;
    Some(suffix[colon_idx + 1..].to_string())
}

/// Decodes a length-prefixed legacy record: a 4-byte big-endian size
/// followed by exactly that many bytes. Returns `None` (which the caller
/// turns into `CorruptLegacyTask`) if the blob is truncated, padded, or
/// the inner record is empty.
fn decode_legacy_record(bytes: &[u8]) -> Option<Vec<u8>> {
    if bytes.len() < 4 {
        return None;
    }
    let size = BigEndian::read_u32(&bytes[0..4]) as usize;
    if size == 0 || 4 + size != bytes.len() {
        return None;
    }
    Some(bytes[4..4 + size].to_vec())
}

/// Encodes a record into the length-prefixed legacy shape. Exposed for
/// tests that need to build fixtures matching what `decode_legacy_record`
/// expects.
#[cfg(test)]
fn encode_legacy_record(inner: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 4];
    BigEndian::write_u32(&mut buf, inner.len() as u32);
    buf.extend_from_slice(inner);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::test_doubles::{InMemoryAppRepository, InMemoryGroupRepository};
    use crate::kvs::memory::InMemoryKvs;

    const STATE: &str = "/marathon/state";

    fn ctx<'a>(kvs: &'a InMemoryKvs, apps: &'a InMemoryAppRepository, groups: &'a InMemoryGroupRepository) -> StepContext<'a> {
        StepContext { kvs, apps, groups, state_prefix: STATE }
    }

    #[tokio::test]
    async fn rekeys_legacy_task_and_drops_app_segment() {
        let kvs = InMemoryKvs::new();
        let apps = InMemoryAppRepository::new();
        let groups = InMemoryGroupRepository::new();

        let legacy_key = format!("{STATE}/myApp:myApp.9f2c1b-instance");
        kvs.create(&legacy_key, encode_legacy_record(b"task-bytes")).await.unwrap();

        let step = RekeyTasksStep::new(Version::new(0, 13, 0));
        step.apply(&ctx(&kvs, &apps, &groups)).await.unwrap();

        assert!(kvs.load(&legacy_key).await.unwrap().is_none());
        let new_entity = kvs.load(&format!("{STATE}/task:myApp.9f2c1b-instance")).await.unwrap().unwrap();
        assert_eq!(new_entity.bytes, b"task-bytes");
    }

    #[tokio::test]
    async fn non_legacy_keys_are_left_alone() {
        let kvs = InMemoryKvs::new();
        let apps = InMemoryAppRepository::new();
        let groups = InMemoryGroupRepository::new();

        kvs.create(&format!("{STATE}/task:already-new"), b"x".to_vec()).await.unwrap();

        let step = RekeyTasksStep::new(Version::new(0, 13, 0));
        step.apply(&ctx(&kvs, &apps, &groups)).await.unwrap();

        assert!(kvs.load(&format!("{STATE}/task:already-new")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn corrupt_legacy_record_fails_the_step() {
        let kvs = InMemoryKvs::new();
        let apps = InMemoryAppRepository::new();
        let groups = InMemoryGroupRepository::new();

        let legacy_key = format!("{STATE}/myApp:myApp.broken");
        kvs.create(&legacy_key, vec![0, 0, 0, 99]).await.unwrap(); // claims 99 bytes, has none

        let step = RekeyTasksStep::new(Version::new(0, 13, 0));
        let err = step.apply(&ctx(&kvs, &apps, &groups)).await.unwrap_err();
        assert!(matches!(err, MigrationError::CorruptLegacyTask(k) if k == legacy_key));
    }

    #[tokio::test]
    async fn renames_legacy_framework_id_key() {
        let kvs = InMemoryKvs::new();
        let apps = InMemoryAppRepository::new();
        let groups = InMemoryGroupRepository::new();

        kvs.create(LEGACY_FRAMEWORK_ID_KEY, b"fw-123".to_vec()).await.unwrap();

        let step = RekeyTasksStep::new(Version::new(0, 13, 0));
        step.apply(&ctx(&kvs, &apps, &groups)).await.unwrap();

        assert!(kvs.load(LEGACY_FRAMEWORK_ID_KEY).await.unwrap().is_none());
        assert_eq!(kvs.load(FRAMEWORK_ID_KEY).await.unwrap().unwrap().bytes, b"fw-123");
    }

    #[tokio::test]
    async fn leaves_existing_framework_id_untouched() {
        let kvs = InMemoryKvs::new();
        let apps = InMemoryAppRepository::new();
        let groups = InMemoryGroupRepository::new();

        kvs.create(FRAMEWORK_ID_KEY, b"current".to_vec()).await.unwrap();
        kvs.create(LEGACY_FRAMEWORK_ID_KEY, b"stale".to_vec()).await.unwrap();

        let step = RekeyTasksStep::new(Version::new(0, 13, 0));
        step.apply(&ctx(&kvs, &apps, &groups)).await.unwrap();

        assert_eq!(kvs.load(FRAMEWORK_ID_KEY).await.unwrap().unwrap().bytes, b"current");
        assert_eq!(kvs.load(LEGACY_FRAMEWORK_ID_KEY).await.unwrap().unwrap().bytes, b"stale");
    }

    #[test]
    fn legacy_pattern_requires_colon_then_dot() {
        assert!(is_legacy_task_key("myApp:myApp.instance"));
        assert!(!is_legacy_task_key("task:already-new"));
        assert!(!is_legacy_task_key("no-colon-or-dot"));
    }
}

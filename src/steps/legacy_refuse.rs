//! Step → (0.7.0): unconditional refusal of ancient storage.
//!
//! Its presence in the registry guarantees that any attempt to migrate
//! from a (0.7.x, 0.8.x, 0.9.x, 0.10.x) state surfaces a clean,
//! typed error rather than silently "succeeding" by skipping straight to
//! the 0.11.0 rewrite against data it was never designed to read.

use crate::error::MigrationError;
use crate::registry::{Step, StepContext};
use crate::version::Version;
use async_trait::async_trait;

pub struct LegacyRefuseStep {
    target: Version,
}

impl LegacyRefuseStep {
    pub fn new(target: Version) -> Self {
        Self { target }
    }
}

#[async_trait]
impl Step for LegacyRefuseStep {
    fn target_version(&self) -> Version {
        self.target
    }

    async fn apply(&self, _ctx: &StepContext<'_>) -> Result<(), MigrationError> {
        Err(MigrationError::UnsupportedLegacy("migration from 0.7.x not supported anymore".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::test_doubles::{InMemoryAppRepository, InMemoryGroupRepository};
    use crate::kvs::memory::InMemoryKvs;

    #[tokio::test]
    async fn always_fails() {
        let step = LegacyRefuseStep::new(Version::new(0, 7, 0));
        let kvs = InMemoryKvs::new();
        let apps = InMemoryAppRepository::new();
        let groups = InMemoryGroupRepository::new();
        let ctx = StepContext { kvs: &kvs, apps: &apps, groups: &groups, state_prefix: "/state" };

        let err = step.apply(&ctx).await.unwrap_err();
        assert!(matches!(err, MigrationError::UnsupportedLegacy(_)));
    }
}

//! Step → (0.11.0) "AddVersionInfo": backfills per-application version
//! history.
//!
//! For every application, walks its stored historical configs in
//! ascending version order (plus the group's live config, which may be
//! newer than anything in the app repository yet) and derives, for each
//! step in that sequence, whether it represents a genuine configuration
//! change (`forNewConfig`) or a scale/restart on top of the prior config
//! (`withScaleOrRestartChange`). Applications the group no longer
//! references are expunged outright.

use crate::collaborators::{is_upgrade, AppDefinition, AppId, VersionInfo};
use crate::error::MigrationError;
use crate::registry::{Step, StepContext};
use crate::version::Version;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub struct AddVersionInfoStep {
    target: Version,
}

impl AddVersionInfoStep {
    pub fn new(target: Version) -> Self {
        Self { target }
    }
}

#[async_trait]
impl Step for AddVersionInfoStep {
    fn target_version(&self) -> Version {
        self.target
    }

    async fn apply(&self, ctx: &StepContext<'_>) -> Result<(), MigrationError> {
        let group = ctx.groups.load_root().await?.unwrap_or_default();
        let group_apps = group.all_apps();

        let repo_ids: std::collections::BTreeSet<AppId> = ctx.apps.list_ids().await?.into_iter().collect();
        let all_ids: std::collections::BTreeSet<AppId> = repo_ids.union(&group.all_app_ids()).cloned().collect();

        let mut updated_live_apps: BTreeMap<AppId, AppDefinition> = BTreeMap::new();

        for id in all_ids {
            match group_apps.get(&id) {
                Some(live) => {
                    let latest = rewrite_version_history(ctx, &id, live).await?;
                    updated_live_apps.insert(id, latest);
                }
                None => {
                    ctx.apps.expunge(&id).await?;
                }
            }
        }

        let rewritten_group = group.with_updated_apps(&updated_live_apps);
        ctx.groups.store(&rewritten_group.id, rewritten_group).await?;

        Ok(())
    }
}

/// Rewrites the stored version history for a single app and returns its
/// final (latest) definition, which the caller folds back into the group.
async fn rewrite_version_history(ctx: &StepContext<'_>, id: &AppId, live: &AppDefinition) -> Result<AppDefinition, MigrationError> {
    let mut configs = Vec::new();
    for version in ctx.apps.list_versions(id).await? {
        if let Some(config) = ctx.apps.load(id, version).await? {
            configs.push(config);
        }
    }
    // The group's live config may carry a version never persisted to the
    // repository yet; include it so the fold sees the full history.
    if !configs.iter().any(|config| config.version == live.version) {
        configs.push(live.clone());
    }
    configs.sort_by_key(|config| config.version);

    let mut last: Option<AppDefinition> = None;
    let mut latest = live.clone();

    for config in configs {
        let version_info = match &last {
            None => VersionInfo::for_new_config(config.version),
            Some(prev) => {
                if is_upgrade(prev, &config) {
                    VersionInfo::for_new_config(config.version)
                } else {
                    prev.version_info.with_scale_or_restart_change(config.version)
                }
            }
        };

        let produced = AppDefinition { version_info, ..config };
        ctx.apps.store(produced.clone()).await?;
        latest = produced.clone();
        last = Some(produced);
    }

    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::test_doubles::{InMemoryAppRepository, InMemoryGroupRepository};
    use crate::collaborators::{ConfigVersion, Group};
    use crate::kvs::memory::InMemoryKvs;

    fn def(id: &str, version: u64, cmd: &str) -> AppDefinition {
        AppDefinition { id: id.into(), version: ConfigVersion(version), cmd: Some(cmd.into()), instances: 1, version_info: VersionInfo::for_new_config(ConfigVersion(0)) }
    }

    #[tokio::test]
    async fn folds_ascending_history_into_version_info() {
        let apps = InMemoryAppRepository::new();
        apps.seed(def("web", 0, "run web"));
        apps.seed(def("web", 1, "run web")); // scale/restart, same cmd
        apps.seed(def("web", 2, "run web v2")); // upgrade

        let groups = InMemoryGroupRepository::new();
        groups.seed(Group { id: "root".into(), apps: vec![def("web", 2, "run web v2")], groups: vec![] });

        let kvs = InMemoryKvs::new();
        let ctx = StepContext { kvs: &kvs, apps: &apps, groups: &groups, state_prefix: "/state" };
        let step = AddVersionInfoStep::new(Version::new(0, 11, 0));
        step.apply(&ctx).await.unwrap();

        let v0 = apps.load(&"web".to_string(), ConfigVersion(0)).await.unwrap().unwrap();
        let v1 = apps.load(&"web".to_string(), ConfigVersion(1)).await.unwrap().unwrap();
        let v2 = apps.load(&"web".to_string(), ConfigVersion(2)).await.unwrap().unwrap();

        assert_eq!(v0.version_info, VersionInfo::for_new_config(ConfigVersion(0)));
        // v1 is a scale/restart on top of v0: config change marker stays at 0.
        assert_eq!(v1.version_info.last_config_change_at, ConfigVersion(0));
        assert_eq!(v1.version_info.last_scaling_at, ConfigVersion(1));
        // v2 is a genuine upgrade: both markers reset to 2.
        assert_eq!(v2.version_info, VersionInfo::for_new_config(ConfigVersion(2)));
    }

    #[tokio::test]
    async fn app_absent_from_group_is_expunged() {
        let apps = InMemoryAppRepository::new();
        apps.seed(def("orphan", 0, "run"));

        let groups = InMemoryGroupRepository::new();
        groups.seed(Group::default());

        let kvs = InMemoryKvs::new();
        let ctx = StepContext { kvs: &kvs, apps: &apps, groups: &groups, state_prefix: "/state" };
        let step = AddVersionInfoStep::new(Version::new(0, 11, 0));
        step.apply(&ctx).await.unwrap();

        assert!(!apps.contains(&"orphan".to_string()));
    }

    #[tokio::test]
    async fn group_rewritten_with_latest_definitions() {
        let apps = InMemoryAppRepository::new();
        let groups = InMemoryGroupRepository::new();
        groups.seed(Group { id: "root".into(), apps: vec![def("web", 0, "run web")], groups: vec![] });

        let kvs = InMemoryKvs::new();
        let ctx = StepContext { kvs: &kvs, apps: &apps, groups: &groups, state_prefix: "/state" };
        let step = AddVersionInfoStep::new(Version::new(0, 11, 0));
        step.apply(&ctx).await.unwrap();

        let root = groups.load_root().await.unwrap().unwrap();
        assert_eq!(root.apps[0].version_info, VersionInfo::for_new_config(ConfigVersion(0)));
    }
}

//! External collaborators the `AddVersionInfo` step depends on.
//!
//! The scheduler's app and group repositories are real, possibly
//! KVS-backed, components of the host, out of scope for this crate to
//! implement. They're modeled here purely as the traits the step needs, so
//! the step itself is fully unit-testable against in-memory doubles.

use crate::error::MigrationError;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

/// Application identifier.
pub type AppId = String;

/// A monotonically ordered marker for one historical configuration of an
/// application — the "version" in "list-versions(id)", distinct from the
/// crate-wide schema [`crate::version::Version`]. Modeled as a plain
/// ordered counter since the engine only needs relative order, never the
/// wall-clock value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigVersion(pub u64);

/// Per-application derived metadata distinguishing new-config changes
/// from scale/restart-only changes across an app's historical versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    /// The version at which the app's configuration (beyond instance
    /// count) last changed.
    pub last_config_change_at: ConfigVersion,
    /// The version at which the app was last scaled or restarted without
    /// a configuration change.
    pub last_scaling_at: ConfigVersion,
}

impl VersionInfo {
    /// A brand new configuration: both markers reset to `at`.
    pub fn for_new_config(at: ConfigVersion) -> Self {
        Self { last_config_change_at: at, last_scaling_at: at }
    }

    /// A scale or restart with no configuration change: only the scaling
    /// marker advances.
    pub fn with_scale_or_restart_change(&self, at: ConfigVersion) -> Self {
        Self { last_config_change_at: self.last_config_change_at, last_scaling_at: at }
    }
}

/// One historical snapshot of an application's definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDefinition {
    pub id: AppId,
    pub version: ConfigVersion,
    /// Launch command. Any change here (or to future fields added to this
    /// struct) between two stored configs marks the later one as an
    /// upgrade rather than a scale/restart.
    pub cmd: Option<String>,
    pub instances: u32,
    pub version_info: VersionInfo,
}

/// True iff `next` represents a genuine configuration change relative to
/// `prev`, as opposed to a scale (instance count) or restart-only change.
pub fn is_upgrade(prev: &AppDefinition, next: &AppDefinition) -> bool {
    prev.cmd != next.cmd
}

/// A hierarchical container of application definitions.
///
/// Each app entry is the group's *live* definition for that app — the one
/// currently scheduled — which may carry a `ConfigVersion` that hasn't yet
/// been written to the app repository's version history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    pub id: String,
    pub apps: Vec<AppDefinition>,
    pub groups: Vec<Group>,
}

impl Group {
    /// Every app reachable from this group, including nested groups,
    /// keyed by id.
    pub fn all_apps(&self) -> BTreeMap<AppId, AppDefinition> {
        let mut apps: BTreeMap<AppId, AppDefinition> = self.apps.iter().map(|app| (app.id.clone(), app.clone())).collect();
        for child in &self.groups {
            apps.extend(child.all_apps());
        }
        apps
    }

    /// Every app id reachable from this group, including nested groups.
    pub fn all_app_ids(&self) -> BTreeSet<AppId> {
        self.all_apps().keys().cloned().collect()
    }

    /// Returns a copy of this group with every app present in `updates`
    /// replaced by its updated definition, recursively.
    pub fn with_updated_apps(&self, updates: &BTreeMap<AppId, AppDefinition>) -> Group {
        Group {
            id: self.id.clone(),
            apps: self.apps.iter().map(|app| updates.get(&app.id).cloned().unwrap_or_else(|| app.clone())).collect(),
            groups: self.groups.iter().map(|child| child.with_updated_apps(updates)).collect(),
        }
    }
}

/// The scheduler's application repository.
#[async_trait]
pub trait AppRepository: Send + Sync {
    /// All application ids currently known to the repository.
    async fn list_ids(&self) -> Result<Vec<AppId>, MigrationError>;

    /// All historical config versions stored for `id`, in ascending order.
    async fn list_versions(&self, id: &AppId) -> Result<Vec<ConfigVersion>, MigrationError>;

    /// Loads one historical configuration of an app.
    async fn load(&self, id: &AppId, version: ConfigVersion) -> Result<Option<AppDefinition>, MigrationError>;

    /// Persists (or overwrites) one historical configuration of an app.
    async fn store(&self, app: AppDefinition) -> Result<(), MigrationError>;

    /// Removes every trace of an application.
    async fn expunge(&self, id: &AppId) -> Result<(), MigrationError>;
}

/// The scheduler's group repository.
#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Loads the top-level group, or `None` if none has ever been stored.
    async fn load_root(&self) -> Result<Option<Group>, MigrationError>;

    /// Persists the root group under `root_name`.
    async fn store(&self, root_name: &str, group: Group) -> Result<(), MigrationError>;
}

/// Reference in-memory [`AppRepository`]/[`GroupRepository`] adapters.
///
/// Used by this crate's own step tests and by the ops binary, which has
/// no real scheduler to talk to. Hosts wiring the engine against their
/// actual app/group stores should implement the traits directly instead.
pub mod test_doubles {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    /// In-memory [`AppRepository`] double for step unit tests.
    #[derive(Default)]
    pub struct InMemoryAppRepository {
        // app id -> (version -> definition)
        apps: Mutex<BTreeMap<AppId, BTreeMap<ConfigVersion, AppDefinition>>>,
    }

    impl InMemoryAppRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, app: AppDefinition) {
            self.apps.lock().entry(app.id.clone()).or_default().insert(app.version, app);
        }

        pub fn contains(&self, id: &AppId) -> bool {
            self.apps.lock().contains_key(id)
        }
    }

    #[async_trait]
    impl AppRepository for InMemoryAppRepository {
        async fn list_ids(&self) -> Result<Vec<AppId>, MigrationError> {
            Ok(self.apps.lock().keys().cloned().collect())
        }

        async fn list_versions(&self, id: &AppId) -> Result<Vec<ConfigVersion>, MigrationError> {
            Ok(self.apps.lock().get(id).map(|versions| versions.keys().cloned().collect()).unwrap_or_default())
        }

        async fn load(&self, id: &AppId, version: ConfigVersion) -> Result<Option<AppDefinition>, MigrationError> {
            Ok(self.apps.lock().get(id).and_then(|versions| versions.get(&version)).cloned())
        }

        async fn store(&self, app: AppDefinition) -> Result<(), MigrationError> {
            self.apps.lock().entry(app.id.clone()).or_default().insert(app.version, app);
            Ok(())
        }

        async fn expunge(&self, id: &AppId) -> Result<(), MigrationError> {
            self.apps.lock().remove(id);
            Ok(())
        }
    }

    /// In-memory [`GroupRepository`] double for step unit tests.
    #[derive(Default)]
    pub struct InMemoryGroupRepository {
        root: Mutex<Option<Group>>,
    }

    impl InMemoryGroupRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, group: Group) {
            *self.root.lock() = Some(group);
        }
    }

    #[async_trait]
    impl GroupRepository for InMemoryGroupRepository {
        async fn load_root(&self) -> Result<Option<Group>, MigrationError> {
            Ok(self.root.lock().clone())
        }

        async fn store(&self, _root_name: &str, group: Group) -> Result<(), MigrationError> {
            *self.root.lock() = Some(group);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_upgrade_detects_cmd_change() {
        let base = AppDefinition { id: "a".into(), version: ConfigVersion(0), cmd: Some("sleep 1".into()), instances: 1, version_info: VersionInfo::for_new_config(ConfigVersion(0)) };
        let scaled = AppDefinition { instances: 5, version: ConfigVersion(1), ..base.clone() };
        let reconfigured = AppDefinition { cmd: Some("sleep 2".into()), version: ConfigVersion(1), ..base.clone() };

        assert!(!is_upgrade(&base, &scaled));
        assert!(is_upgrade(&base, &reconfigured));
    }

    fn app(id: &str, version: u64) -> AppDefinition {
        AppDefinition { id: id.into(), version: ConfigVersion(version), cmd: None, instances: 1, version_info: VersionInfo::for_new_config(ConfigVersion(version)) }
    }

    #[test]
    fn group_collects_nested_app_ids() {
        let leaf = Group { id: "child".into(), apps: vec![app("b", 0)], groups: vec![] };
        let root = Group { id: "root".into(), apps: vec![app("a", 0)], groups: vec![leaf] };
        assert_eq!(root.all_app_ids(), BTreeSet::from(["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn with_updated_apps_replaces_nested_definitions() {
        let leaf = Group { id: "child".into(), apps: vec![app("b", 0)], groups: vec![] };
        let root = Group { id: "root".into(), apps: vec![app("a", 0)], groups: vec![leaf] };

        let updated_b = app("b", 1);
        let updates = BTreeMap::from([("b".to_string(), updated_b.clone())]);
        let new_root = root.with_updated_apps(&updates);

        assert_eq!(new_root.groups[0].apps[0], updated_b);
        assert_eq!(new_root.apps[0], app("a", 0));
    }
}

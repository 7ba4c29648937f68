//! # statestore-migrate
//!
//! Schema migration engine for a cluster scheduler's persistent
//! key-value store. On every startup, before the scheduler begins
//! accepting work, [`orchestrator::MigrationEngine::migrate`] brings the
//! on-disk schema of an external store forward from whatever version is
//! persisted to the version baked into the current binary: it detects the
//! stored schema version, refuses to run against unsupported old
//! versions, snapshots live state so a crashed migration can be
//! recovered, applies an ordered list of version-specific transformations,
//! persists the new version marker, and clears the in-progress guard.
//!
//! The engine never talks to a concrete store, application repository, or
//! group repository directly — it is written entirely against the traits
//! in [`kvs`] and [`collaborators`], so a host wires in its own adapters.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use statestore_migrate::config::EngineConfig;
//! use statestore_migrate::orchestrator::MigrationEngine;
//! use statestore_migrate::version::Version;
//! use std::sync::Arc;
//!
//! let kvs = Arc::new(my_host::Etcd::connect().await?);
//! let apps = Arc::new(my_host::AppStore::new());
//! let groups = Arc::new(my_host::GroupStore::new());
//! let config = EngineConfig::new("/marathon/state", "/marathon/backup")?;
//! let current = Version::current_from_build(env!("CARGO_PKG_VERSION"))?;
//!
//! let engine = MigrationEngine::with_managed_store(kvs, apps, groups, config, current);
//! let committed = engine.migrate().await?;
//! println!("migrated to {committed}");
//! ```

pub mod backup;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod kvs;
pub mod orchestrator;
pub mod registry;
pub mod steps;
pub mod version;

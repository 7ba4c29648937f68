//! The key-value store capability the engine requires from its host.
//!
//! The engine never talks to a concrete store directly — it is written
//! entirely against [`KeyValueStore`], so any backend (a coordination
//! service, an embedded database, a remote API) can be wired in by
//! implementing the trait. [`memory`] ships a reference in-memory adapter
//! used by this crate's own tests.

pub mod memory;

use crate::error::MigrationError;
use async_trait::async_trait;

/// A single stored entity: an opaque byte blob plus whatever revision
/// token the concrete store uses for optimistic updates.
///
/// The engine treats `bytes` as immutable except where a step explicitly
/// decodes it (the 0.13.0 task rekey step, for instance).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub id: String,
    pub bytes: Vec<u8>,
    /// Opaque revision token used for optimistic-concurrency updates.
    /// Adapters that don't need one may always return the same value.
    pub revision: u64,
}

impl Entity {
    pub fn new(id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { id: id.into(), bytes: bytes.into(), revision: 0 }
    }
}

/// The capability set the engine requires from the external store.
///
/// No ordering or atomicity across keys is assumed — callers that need a
/// happens-before relationship between two calls must await the first
/// before issuing the second (see [`crate::orchestrator`]).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Lists every id currently stored.
    async fn enumerate(&self) -> Result<Vec<String>, MigrationError>;

    /// Loads an entity by id, or `None` if it doesn't exist.
    async fn load(&self, id: &str) -> Result<Option<Entity>, MigrationError>;

    /// Creates a new entity. Fails if `id` already exists.
    async fn create(&self, id: &str, bytes: Vec<u8>) -> Result<Entity, MigrationError>;

    /// Replaces an existing entity's bytes. `entity.revision` must match
    /// what the store currently holds, or the call fails with a stale
    /// revision error bundled into `StoreUnavailable` by simple adapters,
    /// or a dedicated error by more sophisticated ones.
    async fn update(&self, entity: Entity) -> Result<Entity, MigrationError>;

    /// Deletes an entity by id. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, MigrationError>;
}

/// Optional management capability a concrete adapter may advertise.
///
/// `initialize()` is called by the orchestrator's `INIT` phase only if the
/// adapter implements this trait; adapters that don't need any setup
/// simply don't implement it, rather than being forced to provide a
/// no-op `initialize()` on [`KeyValueStore`] itself.
#[async_trait]
pub trait ManagedStore: KeyValueStore {
    async fn initialize(&self) -> Result<(), MigrationError>;
}

//! Reference in-memory [`KeyValueStore`] adapter.
//!
//! Used by this crate's own test suite and doctests. Hosts wiring the
//! engine against a real coordination service or embedded database should
//! implement [`KeyValueStore`] directly against that backend instead.

use super::{Entity, KeyValueStore, ManagedStore};
use crate::error::MigrationError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// A `BTreeMap`-backed store, guarded by a single mutex.
///
/// Iteration order is deterministic (lexicographic by id), which matters
/// for the backup manager's "use any one id" shortcut: tests can rely on
/// a stable first-enumerated id.
#[derive(Default)]
pub struct InMemoryKvs {
    entities: Mutex<BTreeMap<String, Entity>>,
}

impl InMemoryKvs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with an entity, bypassing the `create`/`AlreadyExists`
    /// check. Convenience for test setup.
    pub fn seed(&self, id: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let id = id.into();
        self.entities.lock().insert(id.clone(), Entity::new(id, bytes));
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKvs {
    async fn enumerate(&self) -> Result<Vec<String>, MigrationError> {
        Ok(self.entities.lock().keys().cloned().collect())
    }

    async fn load(&self, id: &str) -> Result<Option<Entity>, MigrationError> {
        Ok(self.entities.lock().get(id).cloned())
    }

    async fn create(&self, id: &str, bytes: Vec<u8>) -> Result<Entity, MigrationError> {
        let mut entities = self.entities.lock();
        if entities.contains_key(id) {
            return Err(MigrationError::StoreUnavailable(format!("key already exists: {id}")));
        }
        let entity = Entity::new(id, bytes);
        entities.insert(id.to_string(), entity.clone());
        Ok(entity)
    }

    async fn update(&self, entity: Entity) -> Result<Entity, MigrationError> {
        let mut entities = self.entities.lock();
        if !entities.contains_key(&entity.id) {
            return Err(MigrationError::StoreUnavailable(format!("key not found: {}", entity.id)));
        }
        let mut updated = entity.clone();
        updated.revision += 1;
        entities.insert(entity.id.clone(), updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<bool, MigrationError> {
        Ok(self.entities.lock().remove(id).is_some())
    }
}

#[async_trait]
impl ManagedStore for InMemoryKvs {
    async fn initialize(&self) -> Result<(), MigrationError> {
        Ok(())
    }
}

//! In-memory mapping store.

use mapper_types::{Mapping, MappingId, MappingStore, MappingStoreError};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    /// Last id handed out; ids start at 1 and are never reused.
    last_id: i64,
    /// id -> mapping.
    by_id: BTreeMap<MappingId, Mapping>,
    /// key -> id.
    key_index: HashMap<String, MappingId>,
}

/// In-memory implementation of MappingStore.
/// Both tables live under one lock, so the key uniqueness check and the write are atomic.
pub struct InMemoryMappingStore {
    tables: RwLock<Tables>,
}

impl InMemoryMappingStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryMappingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MappingStore for InMemoryMappingStore {
    async fn create(&self, key: &str, value: &str) -> Result<Mapping, MappingStoreError> {
        let mut t = self.tables.write().await;
        if t.key_index.contains_key(key) {
            return Err(MappingStoreError::Conflict(key.to_string()));
        }
        t.last_id += 1;
        let mapping = Mapping::new(MappingId(t.last_id), key, value);
        t.key_index.insert(mapping.key.clone(), mapping.id);
        t.by_id.insert(mapping.id, mapping.clone());
        Ok(mapping)
    }

    async fn delete(&self, key: &str) -> Result<(), MappingStoreError> {
        let mut t = self.tables.write().await;
        if let Some(id) = t.key_index.remove(key) {
            t.by_id.remove(&id);
        }
        Ok(())
    }

    async fn update_by_id(
        &self,
        id: MappingId,
        new_key: &str,
        new_value: &str,
    ) -> Result<Mapping, MappingStoreError> {
        let mut t = self.tables.write().await;
        let old_key = match t.by_id.get(&id) {
            Some(m) => m.key.clone(),
            None => return Err(MappingStoreError::NotFound(id)),
        };
        if let Some(owner) = t.key_index.get(new_key) {
            if *owner != id {
                return Err(MappingStoreError::Conflict(new_key.to_string()));
            }
        }
        t.key_index.remove(&old_key);
        t.key_index.insert(new_key.to_string(), id);
        let updated = Mapping::new(id, new_key, new_value);
        t.by_id.insert(id, updated.clone());
        Ok(updated)
    }

    async fn get_all(&self) -> Result<Vec<Mapping>, MappingStoreError> {
        let t = self.tables.read().await;
        Ok(t.by_id.values().cloned().collect())
    }

    async fn get_by_key_prefix(&self, prefix: &str) -> Result<Vec<Mapping>, MappingStoreError> {
        let t = self.tables.read().await;
        Ok(t
            .by_id
            .values()
            .filter(|m| m.key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get_by_key(&self, key: &str) -> Result<Option<Mapping>, MappingStoreError> {
        let t = self.tables.read().await;
        Ok(t.key_index.get(key).and_then(|id| t.by_id.get(id)).cloned())
    }

    async fn get_by_id(&self, id: MappingId) -> Result<Option<Mapping>, MappingStoreError> {
        let t = self.tables.read().await;
        Ok(t.by_id.get(&id).cloned())
    }
}

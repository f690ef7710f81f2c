//! Mapping manager: uniqueness checks on write, link resolution on read.

use crate::LinkResolver;
use mapper_types::{Mapping, MappingError, MappingId, MappingStore};
use std::sync::Arc;

/// Validating layer over a [`MappingStore`].
///
/// The pre-checks here give early, typed errors; the store's own unique constraint stays the
/// final authority, and a constraint violation it reports is surfaced as the same
/// [`MappingError::Conflict`].
pub struct MappingManager<S: ?Sized> {
    store: Arc<S>,
    resolver: LinkResolver<S>,
}

impl<S> MappingManager<S>
where
    S: MappingStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        let resolver = LinkResolver::new(Arc::clone(&store));
        Self { store, resolver }
    }

    pub fn resolver(&self) -> &LinkResolver<S> {
        &self.resolver
    }

    pub async fn add_mapping(&self, key: &str, value: &str) -> Result<Mapping, MappingError> {
        if self.store.get_by_key(key).await?.is_some() {
            return Err(MappingError::Conflict(key.to_string()));
        }
        Ok(self.store.create(key, value).await?)
    }

    pub async fn remove_mapping(&self, key: &str) -> Result<(), MappingError> {
        Ok(self.store.delete(key).await?)
    }

    /// Moving a mapping onto its own current key is always allowed.
    pub async fn update_mapping(
        &self,
        id: MappingId,
        new_key: &str,
        new_value: &str,
    ) -> Result<Mapping, MappingError> {
        let current = self
            .store
            .get_by_id(id)
            .await?
            .ok_or(MappingError::NotFoundById(id))?;
        if current.key != new_key {
            if let Some(owner) = self.store.get_by_key(new_key).await? {
                if owner.id != current.id {
                    return Err(MappingError::Conflict(new_key.to_string()));
                }
            }
        }
        Ok(self.store.update_by_id(id, new_key, new_value).await?)
    }

    pub async fn resolve_target_key(&self, key: &str) -> Result<String, MappingError> {
        self.resolver.resolve_target_key(key).await.map_err(|e| {
            if let MappingError::Cycle(ref cycle) = e {
                tracing::warn!(key = %key, chain = ?cycle.chain, "closed mapping chain");
            }
            e
        })
    }

    /// Terminal value for `key`, or `None` when the resolved key has no mapping.
    pub async fn get_mapped_value(&self, key: &str) -> Result<Option<String>, MappingError> {
        let target = self.resolve_target_key(key).await?;
        Ok(self.store.get_by_key(&target).await?.map(|m| m.value))
    }

    /// Like [`get_mapped_value`](Self::get_mapped_value) but a miss becomes the caller's error.
    pub async fn get_mapped_value_or_else<E, F>(&self, key: &str, on_missing: F) -> Result<String, E>
    where
        F: FnOnce() -> E,
        E: From<MappingError>,
    {
        match self.get_mapped_value(key).await? {
            Some(value) => Ok(value),
            None => Err(on_missing()),
        }
    }

    /// Existence by raw key; references are not followed.
    pub async fn is_mapping_present(&self, key: &str) -> Result<bool, MappingError> {
        Ok(self.store.get_by_key(key).await?.is_some())
    }

    pub async fn get_mapped_values(&self) -> Result<Vec<Mapping>, MappingError> {
        Ok(self.store.get_all().await?)
    }

    pub async fn get_mapped_values_like(&self, prefix: &str) -> Result<Vec<Mapping>, MappingError> {
        Ok(self.store.get_by_key_prefix(prefix).await?)
    }

    pub async fn get_mapping_by_id(&self, id: MappingId) -> Result<Option<Mapping>, MappingError> {
        Ok(self.store.get_by_id(id).await?)
    }

    pub async fn get_mapping_by_key(&self, key: &str) -> Result<Option<Mapping>, MappingError> {
        Ok(self.store.get_by_key(key).await?)
    }
}

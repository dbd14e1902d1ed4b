use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::repository::{Entity, Repository};
use crate::error::{RepositoryError, Result};

/// In-memory repository for development/testing.
///
/// Entities are kept in key order. Keys are never assigned here, so every
/// saved entity must carry one.
pub struct InMemoryRepository<T: Entity> {
    entities: Arc<Mutex<BTreeMap<T::Id, T>>>,
}

impl<T: Entity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Clone for InMemoryRepository<T> {
    fn clone(&self) -> Self {
        Self {
            entities: Arc::clone(&self.entities),
        }
    }
}

impl<T: Entity> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            entities: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

fn require_key<T: Entity>(entity: &T) -> Result<T::Id> {
    entity.id().ok_or_else(|| {
        RepositoryError::InvalidArgument("Entity has no primary key value".to_string())
    })
}

#[async_trait]
impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    async fn save(&self, entity: T) -> Result<T> {
        let id = require_key(&entity)?;
        let mut entities = self.entities.lock()?;
        entities.insert(id.clone(), entity.clone());

        debug!("Saved entity {:?}", id);
        Ok(entity)
    }

    async fn save_all(&self, entities: Vec<T>) -> Result<Vec<T>> {
        let ids = entities
            .iter()
            .map(require_key::<T>)
            .collect::<Result<Vec<T::Id>>>()?;

        let mut stored = self.entities.lock()?;
        for (id, entity) in ids.into_iter().zip(&entities) {
            stored.insert(id, entity.clone());
        }

        debug!("Saved {} entities", entities.len());
        Ok(entities)
    }

    async fn find_all(&self) -> Result<Vec<T>> {
        let entities = self.entities.lock()?;
        Ok(entities.values().cloned().collect())
    }

    async fn find_by_id(&self, id: &T::Id) -> Result<Option<T>> {
        let entities = self.entities.lock()?;
        Ok(entities.get(id).cloned())
    }

    async fn find_all_by_id(&self, ids: &[T::Id]) -> Result<Vec<T>> {
        let entities = self.entities.lock()?;
        let found: BTreeMap<&T::Id, &T> = ids
            .iter()
            .filter_map(|id| entities.get(id).map(|e| (id, e)))
            .collect();
        Ok(found.into_values().cloned().collect())
    }

    async fn exists_by_id(&self, id: &T::Id) -> Result<bool> {
        let entities = self.entities.lock()?;
        Ok(entities.contains_key(id))
    }

    async fn count(&self) -> Result<u64> {
        let entities = self.entities.lock()?;
        Ok(entities.len() as u64)
    }

    async fn delete(&self, entity: &T) -> Result<()> {
        let id = require_key(entity)?;
        self.delete_by_id(&id).await
    }

    async fn delete_all(&self, entities: &[T]) -> Result<()> {
        let ids = entities
            .iter()
            .map(require_key::<T>)
            .collect::<Result<Vec<T::Id>>>()?;
        self.delete_all_by_id(&ids).await
    }

    async fn delete_by_id(&self, id: &T::Id) -> Result<()> {
        let mut entities = self.entities.lock()?;
        if entities.remove(id).is_some() {
            debug!("Deleted entity {:?}", id);
        }
        Ok(())
    }

    async fn delete_all_by_id(&self, ids: &[T::Id]) -> Result<()> {
        let mut entities = self.entities.lock()?;
        let removed = ids
            .iter()
            .filter(|id| entities.remove(*id).is_some())
            .count();

        debug!("Deleted {} entities", removed);
        Ok(())
    }
}

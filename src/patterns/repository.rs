use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Debug;

use crate::error::Result;

/// A persisted value identified by a primary key.
pub trait Entity: Clone + Send + Sync + 'static {
    type Id: Clone + Ord + Debug + Serialize + Send + Sync + 'static;

    /// The primary key, or `None` when the store has not assigned one yet.
    fn id(&self) -> Option<Self::Id>;
}

/// Generic CRUD access to entities of one type.
///
/// Every backend orders multi-entity results by primary key. Operations that
/// take a collection validate all of it before touching the store.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Inserts the entity, or updates the stored one with the same key.
    ///
    /// Returns the state as stored; it may differ from the argument (for
    /// example a freshly assigned key), so callers should continue with the
    /// returned value.
    async fn save(&self, entity: T) -> Result<T>;

    /// Saves every entity. The result has the same length and order as the
    /// input. Nothing is written when any entity is rejected.
    async fn save_all(&self, entities: Vec<T>) -> Result<Vec<T>>;

    async fn find_all(&self) -> Result<Vec<T>>;

    async fn find_by_id(&self, id: &T::Id) -> Result<Option<T>>;

    /// Returns the entities whose key is among `ids`. Unknown keys are
    /// skipped and duplicate keys collapse, so the result may be shorter
    /// than `ids`.
    async fn find_all_by_id(&self, ids: &[T::Id]) -> Result<Vec<T>>;

    async fn exists_by_id(&self, id: &T::Id) -> Result<bool>;

    async fn count(&self) -> Result<u64>;

    /// Deletes the stored entity with the same key. Absent entities are
    /// ignored.
    async fn delete(&self, entity: &T) -> Result<()>;

    async fn delete_all(&self, entities: &[T]) -> Result<()>;

    /// Deletes by key. Absent keys are ignored.
    async fn delete_by_id(&self, id: &T::Id) -> Result<()>;

    async fn delete_all_by_id(&self, ids: &[T::Id]) -> Result<()>;
}

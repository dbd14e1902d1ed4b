use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Params};
use std::collections::BTreeSet;
use std::marker::PhantomData;
use tracing::{debug, info};

use super::repository::Repository;
use super::table::{
    assigns_keys, column_list, create_table_sql, entity_to_values, id_to_sql, primary_key,
    quote_ident, row_to_entity, Table,
};
use crate::db::Database;
use crate::error::{RepositoryError, Result};

/// Keys bound per statement; stays well under SQLite's variable limit.
const KEY_CHUNK: usize = 500;

/// SQLite-backed repository for one [`Table`].
pub struct CrudRepository<T> {
    db: Database,
    _model: PhantomData<fn() -> T>,
}

impl<T> Clone for CrudRepository<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _model: PhantomData,
        }
    }
}

impl<T: Table> CrudRepository<T> {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            _model: PhantomData,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn create_table(&self) -> Result<()> {
        let sql = create_table_sql::<T>()?;
        self.db
            .run(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await?;
        info!("Created table {}", T::TABLE);
        Ok(())
    }

    pub async fn drop_table(&self) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", quote_ident(T::TABLE));
        self.db
            .run(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await?;
        info!("Dropped table {}", T::TABLE);
        Ok(())
    }
}

fn ensure_saveable<T: Table>(entity: &T) -> Result<()> {
    if entity.id().is_none() && !assigns_keys::<T>()? {
        return Err(RepositoryError::InvalidArgument(format!(
            "Entity for table '{}' has no primary key value",
            T::TABLE
        )));
    }
    Ok(())
}

fn require_key<T: Table>(entity: &T) -> Result<T::Id> {
    entity.id().ok_or_else(|| {
        RepositoryError::InvalidArgument(format!(
            "Entity for table '{}' has no primary key value",
            T::TABLE
        ))
    })
}

fn query_entities<T: Table, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut entities = Vec::new();
    while let Some(row) = rows.next()? {
        entities.push(row_to_entity::<T>(row)?);
    }
    Ok(entities)
}

fn select_by_key<T: Table>(conn: &Connection, key: &Value) -> Result<Option<T>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1",
        column_list::<T>(),
        quote_ident(T::TABLE),
        quote_ident(primary_key::<T>()?.name)
    );
    let found = query_entities::<T, _>(conn, &sql, [key])?;
    Ok(found.into_iter().next())
}

fn delete_by_key<T: Table>(conn: &Connection, key: &Value) -> Result<usize> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?1",
        quote_ident(T::TABLE),
        quote_ident(primary_key::<T>()?.name)
    );
    Ok(conn.execute(&sql, [key])?)
}

/// Upserts one entity and reads back what was stored.
fn save_row<T: Table>(conn: &Connection, entity: &T) -> Result<T> {
    let key = primary_key::<T>()?;
    let values = entity_to_values(entity)?;

    let placeholders: Vec<String> = (1..=T::COLUMNS.len()).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = T::COLUMNS
        .iter()
        .filter(|c| !c.primary_key)
        .map(|c| format!("{0} = excluded.{0}", quote_ident(c.name)))
        .collect();
    let conflict = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
        quote_ident(T::TABLE),
        column_list::<T>(),
        placeholders.join(", "),
        quote_ident(key.name),
        conflict
    );
    conn.execute(&sql, params_from_iter(values.iter()))?;

    let stored_key = match entity.id() {
        Some(id) => id_to_sql::<T>(&id)?,
        None => Value::Integer(conn.last_insert_rowid()),
    };
    select_by_key::<T>(conn, &stored_key)?.ok_or_else(|| {
        RepositoryError::Mapping(format!(
            "Saved row in '{}' could not be read back",
            T::TABLE
        ))
    })
}

#[async_trait]
impl<T: Table> Repository<T> for CrudRepository<T> {
    async fn save(&self, entity: T) -> Result<T> {
        ensure_saveable(&entity)?;
        let saved = self
            .db
            .run(move |conn| {
                let tx = conn.transaction()?;
                let saved = save_row(&tx, &entity)?;
                tx.commit()?;
                Ok(saved)
            })
            .await?;
        debug!("Saved {} row {:?}", T::TABLE, saved.id());
        Ok(saved)
    }

    async fn save_all(&self, entities: Vec<T>) -> Result<Vec<T>> {
        for entity in &entities {
            ensure_saveable(entity)?;
        }
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let saved = self
            .db
            .run(move |conn| {
                let tx = conn.transaction()?;
                let saved = entities
                    .iter()
                    .map(|entity| save_row(&tx, entity))
                    .collect::<Result<Vec<T>>>()?;
                tx.commit()?;
                Ok(saved)
            })
            .await?;
        debug!("Saved {} rows in {}", saved.len(), T::TABLE);
        Ok(saved)
    }

    async fn find_all(&self) -> Result<Vec<T>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            column_list::<T>(),
            quote_ident(T::TABLE),
            quote_ident(primary_key::<T>()?.name)
        );
        self.db
            .run(move |conn| query_entities::<T, _>(conn, &sql, []))
            .await
    }

    async fn find_by_id(&self, id: &T::Id) -> Result<Option<T>> {
        let key = id_to_sql::<T>(id)?;
        self.db
            .run(move |conn| select_by_key::<T>(conn, &key))
            .await
    }

    async fn find_all_by_id(&self, ids: &[T::Id]) -> Result<Vec<T>> {
        let unique: BTreeSet<&T::Id> = ids.iter().collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }
        let keys = unique
            .into_iter()
            .map(id_to_sql::<T>)
            .collect::<Result<Vec<Value>>>()?;

        let select = format!(
            "SELECT {} FROM {} WHERE {} IN",
            column_list::<T>(),
            quote_ident(T::TABLE),
            quote_ident(primary_key::<T>()?.name)
        );
        let mut found = self
            .db
            .run(move |conn| {
                let mut found = Vec::with_capacity(keys.len());
                for chunk in keys.chunks(KEY_CHUNK) {
                    let placeholders = vec!["?"; chunk.len()].join(", ");
                    let sql = format!("{select} ({placeholders})");
                    let params = params_from_iter(chunk.iter());
                    found.extend(query_entities::<T, _>(conn, &sql, params)?);
                }
                Ok(found)
            })
            .await?;
        found.sort_by_key(|entity| entity.id());
        Ok(found)
    }

    async fn exists_by_id(&self, id: &T::Id) -> Result<bool> {
        let key = id_to_sql::<T>(id)?;
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1)",
            quote_ident(T::TABLE),
            quote_ident(primary_key::<T>()?.name)
        );
        self.db
            .run(move |conn| Ok(conn.query_row(&sql, [&key], |row| row.get::<_, bool>(0))?))
            .await
    }

    async fn count(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(T::TABLE));
        let count: i64 = self
            .db
            .run(move |conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
            .await?;
        Ok(count as u64)
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
        let key = id_to_sql::<T>(id)?;
        let removed = self
            .db
            .run(move |conn| delete_by_key::<T>(conn, &key))
            .await?;
        debug!("Deleted {} row(s) from {} for {:?}", removed, T::TABLE, id);
        Ok(())
    }

    async fn delete_all_by_id(&self, ids: &[T::Id]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let keys = ids
            .iter()
            .map(id_to_sql::<T>)
            .collect::<Result<Vec<Value>>>()?;

        let removed = self
            .db
            .run(move |conn| {
                let tx = conn.transaction()?;
                let mut removed = 0;
                for key in &keys {
                    removed += delete_by_key::<T>(&tx, key)?;
                }
                tx.commit()?;
                Ok(removed)
            })
            .await?;
        debug!("Deleted {} row(s) from {}", removed, T::TABLE);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::repository::Entity;
    use crate::patterns::table::{Column, ColumnKind};
    use serde::{Deserialize, Deserializer, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tag {
        name: String,
    }

    impl Entity for Tag {
        type Id = String;

        fn id(&self) -> Option<String> {
            Some(self.name.clone())
        }
    }

    impl Table for Tag {
        const TABLE: &'static str = "tags";
        const COLUMNS: &'static [Column] = &[Column::new("name", ColumnKind::Text).primary_key()];
    }

    #[tokio::test]
    async fn test_key_only_table_upserts_without_error() {
        let repo = CrudRepository::<Tag>::new(Database::in_memory().unwrap());
        repo.create_table().await.unwrap();

        let tag = Tag {
            name: "jazz".to_string(),
        };
        repo.save(tag.clone()).await.unwrap();
        let again = repo.save(tag.clone()).await.unwrap();

        assert_eq!(again, tag);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_all_by_id_spans_chunks() {
        let repo = CrudRepository::<Tag>::new(Database::in_memory().unwrap());
        repo.create_table().await.unwrap();

        let tags: Vec<Tag> = (0..KEY_CHUNK + 20)
            .map(|i| Tag {
                name: format!("tag-{i:04}"),
            })
            .collect();
        repo.save_all(tags.clone()).await.unwrap();

        let ids: Vec<String> = tags.iter().rev().map(|t| t.name.clone()).collect();
        let found = repo.find_all_by_id(&ids).await.unwrap();
        assert_eq!(found, tags);

        repo.delete_all_by_id(&ids).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drop_table() {
        let repo = CrudRepository::<Tag>::new(Database::in_memory().unwrap());
        repo.create_table().await.unwrap();
        assert_eq!(repo.database().table_names().await.unwrap(), vec!["tags"]);

        repo.drop_table().await.unwrap();
        assert!(repo.database().table_names().await.unwrap().is_empty());
        assert!(matches!(
            repo.count().await,
            Err(RepositoryError::Sqlite(_))
        ));
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sealed {
        id: i64,
        #[serde(deserialize_with = "reject_stored")]
        payload: String,
    }

    fn reject_stored<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<String, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Err(serde::de::Error::custom(format!("cannot decode '{raw}'")))
    }

    impl Entity for Sealed {
        type Id = i64;

        fn id(&self) -> Option<i64> {
            Some(self.id)
        }
    }

    impl Table for Sealed {
        const TABLE: &'static str = "sealed";
        const COLUMNS: &'static [Column] = &[
            Column::new("id", ColumnKind::Integer).primary_key(),
            Column::new("payload", ColumnKind::Text),
        ];
    }

    #[tokio::test]
    async fn test_save_rolls_back_when_read_back_fails() {
        let repo = CrudRepository::<Sealed>::new(Database::in_memory().unwrap());
        repo.create_table().await.unwrap();

        let sealed = Sealed {
            id: 1,
            payload: "secret".to_string(),
        };
        assert!(matches!(
            repo.save(sealed).await,
            Err(RepositoryError::Json(_))
        ));
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}

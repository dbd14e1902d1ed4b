#![allow(dead_code)]

use crud_patterns::{Column, ColumnKind, CrudRepository, Database, Entity, Table};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: Option<i64>,
    pub name: String,
}

impl Model {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id: Some(id),
            name: name.to_string(),
        }
    }
}

impl Entity for Model {
    type Id = i64;

    fn id(&self) -> Option<i64> {
        self.id
    }
}

impl Table for Model {
    const TABLE: &'static str = "model";
    const COLUMNS: &'static [Column] = &[
        Column::new("id", ColumnKind::Integer).primary_key(),
        Column::new("name", ColumnKind::Text),
    ];
}

/// Text-keyed entity; the store cannot assign its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Option<String>,
    pub body: String,
}

impl Entity for Note {
    type Id = String;

    fn id(&self) -> Option<String> {
        self.id.clone()
    }
}

impl Table for Note {
    const TABLE: &'static str = "notes";
    const COLUMNS: &'static [Column] = &[
        Column::new("id", ColumnKind::Text).primary_key(),
        Column::new("body", ColumnKind::Text),
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub published: bool,
    pub tags: Vec<String>,
    pub score: Option<f64>,
}

impl Entity for Document {
    type Id = Uuid;

    fn id(&self) -> Option<Uuid> {
        Some(self.id)
    }
}

impl Table for Document {
    const TABLE: &'static str = "documents";
    const COLUMNS: &'static [Column] = &[
        Column::new("id", ColumnKind::Text).primary_key(),
        Column::new("title", ColumnKind::Text),
        Column::new("published", ColumnKind::Boolean),
        Column::new("tags", ColumnKind::Json),
        Column::new("score", ColumnKind::Real).nullable(),
    ];
}

/// Maps a list onto a plain text column, which the mapping rejects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: Option<i64>,
    pub labels: Vec<String>,
}

impl Entity for Playlist {
    type Id = i64;

    fn id(&self) -> Option<i64> {
        self.id
    }
}

impl Table for Playlist {
    const TABLE: &'static str = "playlists";
    const COLUMNS: &'static [Column] = &[
        Column::new("id", ColumnKind::Integer).primary_key(),
        Column::new("labels", ColumnKind::Text),
    ];
}

pub fn entity() -> Model {
    Model::new(1, "Entity")
}

pub fn entities() -> Vec<Model> {
    vec![
        Model::new(1, "Entity 1"),
        Model::new(2, "Entity 2"),
        Model::new(3, "Entity 3"),
    ]
}

pub fn note(id: &str) -> Note {
    Note {
        id: Some(id.to_string()),
        body: format!("body of {id}"),
    }
}

pub async fn repository<T: Table>() -> anyhow::Result<CrudRepository<T>> {
    let repo = CrudRepository::<T>::new(Database::in_memory()?);
    repo.create_table().await?;
    Ok(repo)
}

/// Inserts rows with plain SQL, bypassing the repository.
pub async fn seed(db: &Database, models: &[Model]) -> anyhow::Result<()> {
    let models = models.to_vec();
    db.run(move |conn| {
        for model in &models {
            conn.execute(
                "INSERT INTO model (id, name) VALUES (?1, ?2)",
                rusqlite::params![model.id, model.name],
            )?;
        }
        Ok(())
    })
    .await?;
    Ok(())
}

/// Reads one row with plain SQL, bypassing the repository.
pub async fn stored_name(db: &Database, id: i64) -> anyhow::Result<Option<String>> {
    let name = db
        .run(move |conn| {
            let mut stmt = conn.prepare("SELECT name FROM model WHERE id = ?1")?;
            let mut rows = stmt.query([id])?;
            let name = match rows.next()? {
                Some(row) => Some(row.get::<_, String>(0)?),
                None => None,
            };
            Ok(name)
        })
        .await?;
    Ok(name)
}

use rusqlite::Connection;
use serde_json::{Map, Value as JsonValue};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::{RepositoryError, Result};
use crate::patterns::table::{quote_ident, value_ref_to_json};

/// Shared handle to one SQLite connection.
///
/// Cloning is cheap; all clones use the same connection. Work runs on the
/// tokio blocking pool through [`Database::run`].
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: String,
}

impl Database {
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            let db_path = Path::new(&config.path);
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(db_path)?
        };

        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        let mut pragmas = format!(
            "PRAGMA foreign_keys = {};",
            if config.foreign_keys { "ON" } else { "OFF" }
        );
        let journal_mode = config
            .journal_mode
            .as_deref()
            .filter(|_| !config.is_in_memory());
        if let Some(mode) = journal_mode {
            if mode.is_empty() || !mode.chars().all(|c| c.is_ascii_alphabetic()) {
                let message = format!("Invalid journal mode '{mode}'");
                return Err(RepositoryError::Config(message));
            }
            pragmas.push_str(&format!("PRAGMA journal_mode = {mode};"));
        }
        conn.execute_batch(&pragmas)?;

        info!("Opened SQLite database at {}", config.path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: config.path.clone(),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(&DatabaseConfig::in_memory())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Runs `f` against the locked connection on the blocking pool.
    pub async fn run<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock()?;
            f(&mut guard)
        })
        .await?
    }

    /// User tables, sorted by name.
    pub async fn table_names(&self) -> Result<Vec<String>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })
        .await
    }

    pub async fn count_rows(&self, table: &str) -> Result<u64> {
        self.ensure_table(table).await?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        self.run(move |conn| {
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    /// Reads rows of any table as JSON objects keyed by column name.
    pub async fn dump_rows(
        &self,
        table: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Map<String, JsonValue>>> {
        self.ensure_table(table).await?;
        // LIMIT -1 means no limit; larger limits saturate
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let sql = format!("SELECT * FROM {} LIMIT ?1", quote_ident(table));
        debug!("Dumping rows: {} ({})", sql, limit);

        self.run(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query([limit])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut object = Map::with_capacity(names.len());
                for (idx, name) in names.iter().enumerate() {
                    object.insert(name.clone(), value_ref_to_json(row.get_ref(idx)?)?);
                }
                out.push(object);
            }
            Ok(out)
        })
        .await
    }

    async fn ensure_table(&self, table: &str) -> Result<()> {
        if self.table_names().await?.iter().any(|t| t == table) {
            Ok(())
        } else {
            Err(RepositoryError::InvalidArgument(format!(
                "Unknown table '{table}'"
            )))
        }
    }
}

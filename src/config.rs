use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

use crate::error::{RepositoryError, Result};

pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// File path of the SQLite database, or `:memory:`.
    pub path: String,
    /// Applied to file databases only.
    pub journal_mode: Option<String>,
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: IN_MEMORY.to_string(),
            journal_mode: Some("WAL".to_string()),
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_string_lossy().into_owned(),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            RepositoryError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }

    /// Builds a config from `CRUD_*` environment variables, reading `.env`
    /// first when present. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut database = DatabaseConfig::default();
        if let Some(path) = read_var("CRUD_DATABASE_PATH")? {
            database.path = path;
        }
        if let Some(mode) = read_var("CRUD_JOURNAL_MODE")? {
            database.journal_mode = if mode.is_empty() { None } else { Some(mode) };
        }
        if let Some(timeout) = read_var("CRUD_BUSY_TIMEOUT_MS")? {
            database.busy_timeout_ms = timeout.parse().map_err(|e| {
                RepositoryError::Config(format!("CRUD_BUSY_TIMEOUT_MS '{timeout}': {e}"))
            })?;
        }
        if let Some(flag) = read_var("CRUD_FOREIGN_KEYS")? {
            database.foreign_keys = parse_flag(&flag).ok_or_else(|| {
                RepositoryError::Config(format!("CRUD_FOREIGN_KEYS '{flag}' is not a boolean"))
            })?;
        }

        Ok(Self { database })
    }
}

fn read_var(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

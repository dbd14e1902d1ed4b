pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod patterns;

// Re-export commonly used types
pub use config::{Config, DatabaseConfig};
pub use db::Database;
pub use error::{RepositoryError, Result};
pub use patterns::*;

use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{RepositoryError, Result};

const DEFAULT_DIRECTIVE: &str = "crud_patterns=info";

/// Initializes console logging, plus a daily-rotated JSON log file when
/// `log_dir` is given.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the program. Calling this twice returns an error.
pub fn init_logging(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_DIRECTIVE))
        .map_err(|e| RepositoryError::Config(format!("Invalid log filter: {e}")))?;

    let console_layer = fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "crud_patterns.log");
            let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
            (
                Some(fmt::layer().json().with_writer(non_blocking_writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| RepositoryError::Config(format!("Logging already initialized: {e}")))?;

    Ok(guard)
}

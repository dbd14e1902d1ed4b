use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, error};

use crud_patterns::logging;
use crud_patterns::{Config, Database};

#[derive(Parser)]
#[command(name = "crud-patterns")]
#[command(about = "Inspect SQLite databases managed by crud_patterns repositories")]
#[command(version)]
struct Cli {
    /// TOML config file; falls back to CRUD_* environment variables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overriding the configured one
    #[arg(long, global = true)]
    database: Option<String>,

    /// Also write JSON logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tables
    Tables,
    /// Count rows in a table
    Count { table: String },
    /// Print rows of a table as JSON lines
    Dump {
        table: String,
        /// Maximum number of rows to print
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init_logging(cli.log_dir.as_deref())?;

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    if let Some(path) = cli.database {
        config.database.path = path;
    }
    debug!("Using database config {:?}", config.database);

    let db = Database::open(&config.database)?;

    let outcome = match cli.command {
        Commands::Tables => db.table_names().await.map(|tables| {
            for table in tables {
                println!("{table}");
            }
        }),
        Commands::Count { table } => db
            .count_rows(&table)
            .await
            .map(|count| println!("{table}: {count}")),
        Commands::Dump { table, limit } => db.dump_rows(&table, limit).await.map(|rows| {
            for row in rows {
                println!("{}", serde_json::Value::Object(row));
            }
        }),
    };

    if let Err(e) = &outcome {
        error!("Command failed: {}", e);
        eprintln!("❌ {e}");
    }
    Ok(outcome?)
}

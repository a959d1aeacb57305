//! coinetl ingest - crypto market data ingestion tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coinetl_common::logging::{init_logging, LogConfig, LogLevel};
use coinetl_common::types::SourceKind;
use coinetl_ingest::{
    CheckpointStore, IngestConfig, IngestError, MemoryStore, Orchestrator, PgCheckpointStore, PgRecordLoader,
    RecordLoader, Source,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "coinetl-ingest")]
#[command(author, version, about = "Crypto market data ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one ingestion pass
    Run {
        /// Only run this source (coinpaprika, coingecko, csv)
        #[arg(short, long)]
        source: Option<SourceKind>,

        /// Keep everything in memory instead of writing to the database
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("coinetl-ingest")
        .build();

    // Environment variables take precedence
    let log_config = LogConfig::from_vars(log_config, |key| std::env::var(key).ok())?;
    let _guard = init_logging(&log_config)?;

    let config = IngestConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        Command::Run { source, dry_run } => run(config, source, dry_run).await?,
    }

    info!("Ingestion complete");
    Ok(())
}

async fn run(config: IngestConfig, only: Option<SourceKind>, dry_run: bool) -> Result<()> {
    let sources = Source::all_enabled(&config)?;
    info!(
        sources = ?sources.iter().map(Source::kind).collect::<Vec<_>>(),
        fetch_limit = config.fetch_limit,
        dry_run,
        "Configuration loaded"
    );

    let (checkpoints, loader) = if dry_run {
        let store = Arc::new(MemoryStore::new());
        (store.clone() as Arc<dyn CheckpointStore>, store as Arc<dyn RecordLoader>)
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database.url)
            .await
            .context("Failed to connect to database")?;
        info!("Database connection pool established");

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .map_err(IngestError::from)
            .context("Failed to run migrations")?;
        info!("Database migrations completed");

        (
            Arc::new(PgCheckpointStore::new(pool.clone())) as Arc<dyn CheckpointStore>,
            Arc::new(PgRecordLoader::new(pool)) as Arc<dyn RecordLoader>,
        )
    };

    let orchestrator = Orchestrator::new(sources, checkpoints, loader, config.fetch_limit);

    match only {
        Some(kind) => {
            orchestrator.run_source(kind).await;
        },
        None => orchestrator.run_all().await,
    }

    Ok(())
}

//! coinetl ingestion library
//!
//! Pulls cryptocurrency market data from several providers, keeps every raw
//! item for audit, normalizes it into one canonical schema and upserts it
//! idempotently. Each source's run state lives in a checkpoint used as a
//! re-entrancy guard.
//!
//! # Supported Sources
//!
//! - **CoinPaprika**: `/tickers` REST endpoint
//! - **CoinGecko**: `/coins/markets` REST endpoint
//! - **CSV**: a local file with one row per coin
//!
//! # Example
//!
//! ```no_run
//! use coinetl_ingest::{IngestConfig, MemoryStore, Orchestrator, Source};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let store = Arc::new(MemoryStore::new());
//!     let orchestrator = Orchestrator::new(
//!         Source::all_enabled(&config)?,
//!         store.clone(),
//!         store,
//!         config.fetch_limit,
//!     );
//!     orchestrator.run_all().await;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod loader;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod sources;
pub mod transformer;

pub use checkpoint::{CheckpointStore, PgCheckpointStore, RunOutcome};
pub use config::IngestConfig;
pub use error::{FetchError, IngestError, Result, SkipReason};
pub use loader::{PgRecordLoader, RecordLoader};
pub use memory::MemoryStore;
pub use orchestrator::{Orchestrator, SourceRunOutcome};
pub use sources::Source;

//! coinetl Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging and error handling for the coinetl workspace.
//!
//! # Overview
//!
//! This crate provides the pieces that every consumer of ingested data needs,
//! whether it writes the data (the ingestion pipeline) or only reads it
//! (reporting, inspection tools):
//!
//! - **Types**: sources, checkpoints and canonical records
//! - **Error Handling**: Custom error types and result types
//! - **Logging**: Centralized `tracing` subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use coinetl_common::types::{CheckpointStatus, SourceKind};
//!
//! fn main() -> coinetl_common::Result<()> {
//!     let source: SourceKind = "coingecko".parse()?;
//!     let status: CheckpointStatus = "running".parse()?;
//!     println!("{} is {}", source, status);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CoinEtlError, Result};

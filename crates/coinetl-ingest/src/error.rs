//! Ingestion error types
//!
//! Errors are split by how far they are allowed to travel:
//!
//! - [`SkipReason`]: a single item could not be parsed or normalized. It is
//!   logged and the item dropped; it never escapes its batch.
//! - [`FetchError`]: a provider request failed. Transient variants are retried
//!   by the fetcher, everything else ends the fetch.
//! - [`IngestError`]: a whole source run failed. The orchestrator records it
//!   on the source's checkpoint and moves on.

use coinetl_common::{types::SourceKind, CoinEtlError};
use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Error types for a source run
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{kind} fetch failed: {error}")]
    Fetch {
        kind: SourceKind,
        #[source]
        error: FetchError,
    },

    #[error("Failed to load {table} records: {message}")]
    Load { table: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] CoinEtlError),
}

impl IngestError {
    pub(crate) fn load(table: impl Into<String>, err: impl std::fmt::Display) -> Self {
        IngestError::Load {
            table: table.into(),
            message: err.to_string(),
        }
    }
}

/// Failure of a single provider request, or of a whole retried fetch
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("rate limited (HTTP 429)")]
    RateLimited,

    #[error("server error: HTTP {0}")]
    Server(StatusCode),

    #[error("request rejected: HTTP {0}")]
    Rejected(StatusCode),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("failed to read {}: {error}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    /// Whether another attempt could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Network(_) | FetchError::RateLimited | FetchError::Server(_)
        )
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited,
            StatusCode::REQUEST_TIMEOUT => FetchError::Server(status),
            s if s.is_server_error() => FetchError::Server(s),
            s => FetchError::Rejected(s),
        }
    }
}

/// Why a single raw item was dropped from its batch
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("malformed item: {0}")]
    Malformed(String),

    #[error("missing coin id")]
    MissingCoinId,

    #[error("{field} is not a finite, non-negative number: {value}")]
    InvalidNumber { field: &'static str, value: f64 },
}

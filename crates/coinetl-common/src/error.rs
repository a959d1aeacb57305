//! Error types for coinetl

use thiserror::Error;

/// Result type alias for coinetl operations
pub type Result<T> = std::result::Result<T, CoinEtlError>;

/// Main error type for the shared coinetl types
#[derive(Error, Debug)]
pub enum CoinEtlError {
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Invalid checkpoint status: {0}")]
    InvalidStatus(String),

    #[error("Invalid {setting} value: {value}")]
    InvalidSetting { setting: &'static str, value: String },
}

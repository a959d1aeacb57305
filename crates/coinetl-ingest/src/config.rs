//! Ingestion configuration
//!
//! All settings come from environment variables (optionally seeded from a
//! `.env` file). Each component receives the slice of configuration it needs
//! at construction time.

use coinetl_common::types::SourceKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{IngestError, Result};

// ============================================================================
// Configuration Defaults
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/coinetl";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

pub const DEFAULT_COINPAPRIKA_BASE_URL: &str = "https://api.coinpaprika.com/v1";
pub const DEFAULT_COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";
pub const DEFAULT_CSV_FILE_PATH: &str = "data/sample.csv";

/// Default number of attempts per provider request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default first backoff delay in seconds.
pub const DEFAULT_INITIAL_RETRY_DELAY_SECS: f64 = 1.0;

/// Default backoff ceiling in seconds.
pub const DEFAULT_MAX_RETRY_DELAY_SECS: f64 = 60.0;

/// Default pause after every successful request, in seconds.
pub const DEFAULT_RATE_LIMIT_DELAY_SECS: f64 = 0.5;

/// Default per-request HTTP timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default number of items fetched per source per run.
pub const DEFAULT_FETCH_LIMIT: usize = 10;

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub database: DatabaseConfig,
    pub retry: RetryConfig,
    pub coinpaprika: HttpSourceConfig,
    pub coingecko: HttpSourceConfig,
    pub csv: CsvSourceConfig,
    /// Items requested from each source per run
    pub fetch_limit: usize,
    /// Sources that take part in a full run, always in `SourceKind::ALL` order
    pub enabled_sources: Vec<SourceKind>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Retry, backoff and pacing shared by every HTTP provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub rate_limit_delay: Duration,
    pub request_timeout: Duration,
}

/// Connection settings for an HTTP provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSourceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

/// Settings for the file-based provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvSourceConfig {
    pub file_path: PathBuf,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_retry_delay: Duration::from_secs_f64(DEFAULT_INITIAL_RETRY_DELAY_SECS),
            max_retry_delay: Duration::from_secs_f64(DEFAULT_MAX_RETRY_DELAY_SECS),
            rate_limit_delay: Duration::from_secs_f64(DEFAULT_RATE_LIMIT_DELAY_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            },
            retry: RetryConfig::default(),
            coinpaprika: HttpSourceConfig {
                base_url: DEFAULT_COINPAPRIKA_BASE_URL.to_string(),
                api_key: None,
            },
            coingecko: HttpSourceConfig {
                base_url: DEFAULT_COINGECKO_BASE_URL.to_string(),
                api_key: None,
            },
            csv: CsvSourceConfig {
                file_path: PathBuf::from(DEFAULT_CSV_FILE_PATH),
            },
            fetch_limit: DEFAULT_FETCH_LIMIT,
            enabled_sources: SourceKind::ALL.to_vec(),
        }
    }
}

impl IngestConfig {
    /// Load configuration from the environment (and `.env`, if present)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")?
                    .unwrap_or(defaults.database.max_connections),
            },
            retry: RetryConfig {
                max_retries: parse_var(&lookup, "MAX_RETRIES")?
                    .unwrap_or(defaults.retry.max_retries),
                initial_retry_delay: secs_var(&lookup, "INITIAL_RETRY_DELAY")?
                    .unwrap_or(defaults.retry.initial_retry_delay),
                max_retry_delay: secs_var(&lookup, "MAX_RETRY_DELAY")?
                    .unwrap_or(defaults.retry.max_retry_delay),
                rate_limit_delay: secs_var(&lookup, "RATE_LIMIT_DELAY")?
                    .unwrap_or(defaults.retry.rate_limit_delay),
                request_timeout: parse_var(&lookup, "REQUEST_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.retry.request_timeout),
            },
            coinpaprika: HttpSourceConfig {
                base_url: lookup("COINPAPRIKA_BASE_URL").unwrap_or(defaults.coinpaprika.base_url),
                api_key: non_empty("COINPAPRIKA_API_KEY"),
            },
            coingecko: HttpSourceConfig {
                base_url: lookup("COINGECKO_BASE_URL").unwrap_or(defaults.coingecko.base_url),
                api_key: non_empty("COINGECKO_API_KEY"),
            },
            csv: CsvSourceConfig {
                file_path: lookup("CSV_FILE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.csv.file_path),
            },
            fetch_limit: parse_var(&lookup, "FETCH_LIMIT")?.unwrap_or(defaults.fetch_limit),
            enabled_sources: match lookup("ENABLED_SOURCES") {
                Some(list) => parse_sources(&list)?,
                None => defaults.enabled_sources,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(config_error("DATABASE_URL cannot be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(config_error("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }
        if self.coinpaprika.base_url.is_empty() || self.coingecko.base_url.is_empty() {
            return Err(config_error("provider base URLs cannot be empty"));
        }
        if self.fetch_limit == 0 {
            return Err(config_error("FETCH_LIMIT must be greater than 0"));
        }
        self.retry.validate()
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(config_error("MAX_RETRIES must be at least 1"));
        }
        if self.initial_retry_delay > self.max_retry_delay {
            return Err(config_error(format!(
                "INITIAL_RETRY_DELAY ({:?}) cannot exceed MAX_RETRY_DELAY ({:?})",
                self.initial_retry_delay, self.max_retry_delay
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(config_error("REQUEST_TIMEOUT_SECS must be greater than 0"));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> IngestError {
    IngestError::Config(message.into())
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| config_error(format!("{key}={raw:?} is invalid: {e}")))
        })
        .transpose()
}

/// Fractional seconds, e.g. `0.5`
fn secs_var<F>(lookup: &F, key: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    parse_var::<F, f64>(lookup, key)?
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .map_err(|e| config_error(format!("{key}={secs} is not a valid delay: {e}")))
        })
        .transpose()
}

/// Comma-separated source names, normalized to the fixed run order
fn parse_sources(list: &str) -> Result<Vec<SourceKind>> {
    let mut requested = Vec::new();
    for name in list.split(',').filter(|s| !s.trim().is_empty()) {
        requested.push(name.parse::<SourceKind>()?);
    }
    Ok(SourceKind::ALL
        .into_iter()
        .filter(|kind| requested.contains(kind))
        .collect())
}

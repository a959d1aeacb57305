//! Market data providers
//!
//! The provider set is closed: [`Source`] is an enum over the three fetchers,
//! each exposing the same `fetch(limit)` operation. HTTP providers share the
//! retry policy in [`retry`].

pub mod coingecko;
pub mod coinpaprika;
pub mod csv_file;
pub mod retry;

use chrono::{DateTime, Utc};
use coinetl_common::types::SourceKind;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::config::IngestConfig;
use crate::error::{FetchError, IngestError, Result, SkipReason};
use crate::models::{RawPayload, RawRecord};

pub use coingecko::CoinGeckoSource;
pub use coinpaprika::CoinPaprikaSource;
pub use csv_file::CsvSource;
pub use retry::{Backoff, RetryingClient};

/// A configured provider
#[derive(Debug, Clone)]
pub enum Source {
    CoinPaprika(CoinPaprikaSource),
    CoinGecko(CoinGeckoSource),
    Csv(CsvSource),
}

impl Source {
    /// Build the fetcher for `kind` from configuration
    pub fn from_config(kind: SourceKind, config: &IngestConfig) -> Result<Self> {
        let source = match kind {
            SourceKind::CoinPaprika => Source::CoinPaprika(CoinPaprikaSource::new(
                &config.coinpaprika,
                config.retry.clone(),
            )?),
            SourceKind::CoinGecko => Source::CoinGecko(CoinGeckoSource::new(
                &config.coingecko,
                config.retry.clone(),
            )?),
            SourceKind::Csv => Source::Csv(CsvSource::new(&config.csv)),
        };
        Ok(source)
    }

    /// Build fetchers for every enabled source, in run order
    pub fn all_enabled(config: &IngestConfig) -> Result<Vec<Self>> {
        config
            .enabled_sources
            .iter()
            .map(|kind| Self::from_config(*kind, config))
            .collect()
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Source::CoinPaprika(_) => SourceKind::CoinPaprika,
            Source::CoinGecko(_) => SourceKind::CoinGecko,
            Source::Csv(_) => SourceKind::Csv,
        }
    }

    /// Fetch up to `limit` raw records.
    ///
    /// Malformed items are skipped inside the provider; an error here means
    /// the whole fetch failed.
    pub async fn fetch(&self, limit: usize) -> std::result::Result<Vec<RawRecord>, FetchError> {
        match self {
            Source::CoinPaprika(source) => source.fetch(limit).await,
            Source::CoinGecko(source) => source.fetch(limit).await,
            Source::Csv(source) => source.fetch(limit).await,
        }
    }
}

/// Invalid provider settings found while building a fetcher
pub(crate) fn setup_error(kind: SourceKind, error: impl std::fmt::Display) -> IngestError {
    IngestError::Config(format!("{kind}: {error}"))
}

/// Split a JSON array response into raw records, skipping items that do not
/// have the provider's shape
pub(crate) fn parse_items<T, F>(
    kind: SourceKind,
    body: serde_json::Value,
    ingested_at: DateTime<Utc>,
    wrap: F,
) -> std::result::Result<Vec<RawRecord>, FetchError>
where
    T: DeserializeOwned,
    F: Fn(T) -> RawPayload,
{
    let items = match body {
        serde_json::Value::Array(items) => items,
        other => {
            return Err(FetchError::Decode(format!(
                "expected a JSON array from {kind}, got {}",
                json_kind(&other)
            )))
        },
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let raw_json = item.to_string();
        match serde_json::from_value::<T>(item) {
            Ok(parsed) => records.push(RawRecord {
                payload: wrap(parsed),
                raw_json,
                ingested_at,
            }),
            Err(e) => {
                let reason = SkipReason::Malformed(e.to_string());
                warn!(source = %kind, index, reason = %reason, "Skipping item");
            },
        }
    }

    Ok(records)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

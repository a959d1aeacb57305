//! CoinPaprika tickers

use coinetl_common::types::SourceKind;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::info;

use super::{parse_items, setup_error, RetryingClient};
use crate::config::{HttpSourceConfig, RetryConfig};
use crate::error::{FetchError, Result};
use crate::models::{ingestion_timestamp, CoinPaprikaTicker, RawPayload, RawRecord};

#[derive(Debug, Clone)]
pub struct CoinPaprikaSource {
    client: RetryingClient,
    tickers_url: String,
}

impl CoinPaprikaSource {
    pub fn new(config: &HttpSourceConfig, retry: RetryConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| setup_error(SourceKind::CoinPaprika, e))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = RetryingClient::new(retry, headers)
            .map_err(|e| setup_error(SourceKind::CoinPaprika, e))?;

        Ok(Self {
            client,
            tickers_url: format!("{}/tickers", config.base_url.trim_end_matches('/')),
        })
    }

    /// Top tickers by rank, at most `limit`
    pub async fn fetch(&self, limit: usize) -> std::result::Result<Vec<RawRecord>, FetchError> {
        let body = self
            .client
            .get_json(&self.tickers_url, &[("limit", limit.to_string())])
            .await?;

        let mut records = parse_items::<CoinPaprikaTicker, _>(
            SourceKind::CoinPaprika,
            body,
            ingestion_timestamp(),
            RawPayload::CoinPaprika,
        )?;
        // the endpoint may ignore `limit` and return every ticker
        records.truncate(limit);

        info!(source = "coinpaprika", count = records.len(), "Fetched tickers");
        Ok(records)
    }
}

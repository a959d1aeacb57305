//! CoinGecko markets

use coinetl_common::types::SourceKind;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::info;

use super::{parse_items, setup_error, RetryingClient};
use crate::config::{HttpSourceConfig, RetryConfig};
use crate::error::{FetchError, Result};
use crate::models::{ingestion_timestamp, CoinGeckoMarket, RawPayload, RawRecord};

/// Header carrying a demo-plan API key
pub const API_KEY_HEADER: &str = "x-cg-demo-api-key";

#[derive(Debug, Clone)]
pub struct CoinGeckoSource {
    client: RetryingClient,
    markets_url: String,
}

impl CoinGeckoSource {
    pub fn new(config: &HttpSourceConfig, retry: RetryConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value =
                HeaderValue::from_str(key).map_err(|e| setup_error(SourceKind::CoinGecko, e))?;
            headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
        }

        let client = RetryingClient::new(retry, headers)
            .map_err(|e| setup_error(SourceKind::CoinGecko, e))?;

        Ok(Self {
            client,
            markets_url: format!("{}/coins/markets", config.base_url.trim_end_matches('/')),
        })
    }

    /// First page of USD markets ordered by market cap
    pub async fn fetch(&self, limit: usize) -> std::result::Result<Vec<RawRecord>, FetchError> {
        let query = [
            ("vs_currency", "usd".to_string()),
            ("per_page", limit.to_string()),
            ("page", "1".to_string()),
            ("order", "market_cap_desc".to_string()),
        ];
        let body = self.client.get_json(&self.markets_url, &query).await?;

        let mut records = parse_items::<CoinGeckoMarket, _>(
            SourceKind::CoinGecko,
            body,
            ingestion_timestamp(),
            RawPayload::CoinGecko,
        )?;
        records.truncate(limit);

        info!(source = "coingecko", count = records.len(), "Fetched markets");
        Ok(records)
    }
}

//! Raw provider records
//!
//! Raw records keep every field a provider sent, typed as loosely as the
//! provider's documentation allows, plus a verbatim JSON copy of the item for
//! audit. Normalization into [`CanonicalRecord`](coinetl_common::types::CanonicalRecord)
//! happens in the transformer.

use chrono::{DateTime, SubsecRound, Utc};
use coinetl_common::types::SourceKind;
use serde::{Deserialize, Serialize};

/// One item from `GET /tickers` on CoinPaprika
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoinPaprikaTicker {
    pub id: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub rank: Option<i64>,
    pub circulating_supply: Option<f64>,
    pub total_supply: Option<f64>,
    pub max_supply: Option<f64>,
    #[serde(default)]
    pub quotes: CoinPaprikaQuotes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoinPaprikaQuotes {
    #[serde(rename = "USD")]
    pub usd: Option<CoinPaprikaQuote>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoinPaprikaQuote {
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
    pub percent_change_24h: Option<f64>,
}

/// One item from `GET /coins/markets` on CoinGecko
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoinGeckoMarket {
    pub id: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub total_volume: Option<f64>,
    pub price_change_24h: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
    pub market_cap_rank: Option<i64>,
}

/// One data row of the CSV provider file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CsvRow {
    pub coin_id: String,
    pub name: String,
    pub symbol: String,
    pub price_usd: Option<f64>,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
}

/// Provider-specific payload of a raw record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum RawPayload {
    CoinPaprika(CoinPaprikaTicker),
    CoinGecko(CoinGeckoMarket),
    Csv(CsvRow),
}

/// Source-tagged record exactly as received, retained for audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub payload: RawPayload,
    /// Verbatim serialized copy of the provider item
    pub raw_json: String,
    pub ingested_at: DateTime<Utc>,
}

impl RawRecord {
    pub fn source(&self) -> SourceKind {
        match self.payload {
            RawPayload::CoinPaprika(_) => SourceKind::CoinPaprika,
            RawPayload::CoinGecko(_) => SourceKind::CoinGecko,
            RawPayload::Csv(_) => SourceKind::Csv,
        }
    }

    /// Provider identifier of the coin, if the item carried one
    pub fn coin_id(&self) -> Option<&str> {
        match &self.payload {
            RawPayload::CoinPaprika(t) => t.id.as_deref(),
            RawPayload::CoinGecko(m) => m.id.as_deref(),
            RawPayload::Csv(r) => Some(r.coin_id.as_str()),
        }
    }
}

/// Timestamp stamped on every record of one fetch.
///
/// Truncated to microseconds, the resolution Postgres stores, so the natural
/// key read back from storage equals the one that was written.
pub fn ingestion_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

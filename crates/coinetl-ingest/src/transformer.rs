//! Raw to canonical record mapping
//!
//! Pure and stateless. Each provider has its own field mapping; validation is
//! shared. A record either maps to exactly one [`CanonicalRecord`] or is
//! rejected with a [`SkipReason`].

use coinetl_common::types::{CanonicalRecord, SourceKind};
use tracing::warn;

use crate::error::SkipReason;
use crate::models::{CoinGeckoMarket, CoinPaprikaTicker, CsvRow, RawPayload, RawRecord};

/// Result of transforming a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformedBatch {
    pub records: Vec<CanonicalRecord>,
    /// Coin id (if any) and cause of every dropped record
    pub skipped: Vec<(Option<String>, SkipReason)>,
}

/// Map one raw record to its canonical form
pub fn transform(raw: &RawRecord) -> Result<CanonicalRecord, SkipReason> {
    let record = match &raw.payload {
        RawPayload::CoinPaprika(ticker) => from_coinpaprika(ticker, raw),
        RawPayload::CoinGecko(market) => from_coingecko(market, raw),
        RawPayload::Csv(row) => from_csv(row, raw),
    }?;
    validate(record)
}

/// Map a batch, dropping and logging records that fail
pub fn transform_batch(raw: &[RawRecord]) -> TransformedBatch {
    let mut batch = TransformedBatch {
        records: Vec::with_capacity(raw.len()),
        skipped: Vec::new(),
    };

    for record in raw {
        match transform(record) {
            Ok(canonical) => batch.records.push(canonical),
            Err(reason) => {
                let coin_id = record.coin_id().map(str::to_string);
                warn!(
                    source = %record.source(),
                    coin_id = coin_id.as_deref().unwrap_or("<none>"),
                    reason = %reason,
                    "Dropping record that failed to transform"
                );
                batch.skipped.push((coin_id, reason));
            },
        }
    }

    batch
}

fn from_coinpaprika(ticker: &CoinPaprikaTicker, raw: &RawRecord) -> Result<CanonicalRecord, SkipReason> {
    let usd = ticker.quotes.usd.as_ref();
    Ok(CanonicalRecord {
        coin_id: required_id(ticker.id.as_deref())?,
        name: ticker.name.clone().unwrap_or_default(),
        symbol: ticker.symbol.clone().unwrap_or_default(),
        price_usd: usd.and_then(|q| q.price),
        market_cap: usd.and_then(|q| q.market_cap),
        volume_24h: usd.and_then(|q| q.volume_24h),
        source: SourceKind::CoinPaprika,
        ingested_at: raw.ingested_at,
    })
}

fn from_coingecko(market: &CoinGeckoMarket, raw: &RawRecord) -> Result<CanonicalRecord, SkipReason> {
    Ok(CanonicalRecord {
        coin_id: required_id(market.id.as_deref())?,
        name: market.name.clone().unwrap_or_default(),
        symbol: market.symbol.clone().unwrap_or_default(),
        price_usd: market.current_price,
        market_cap: market.market_cap,
        volume_24h: market.total_volume,
        source: SourceKind::CoinGecko,
        ingested_at: raw.ingested_at,
    })
}

fn from_csv(row: &CsvRow, raw: &RawRecord) -> Result<CanonicalRecord, SkipReason> {
    Ok(CanonicalRecord {
        coin_id: required_id(Some(&row.coin_id))?,
        name: row.name.clone(),
        symbol: row.symbol.clone(),
        price_usd: row.price_usd,
        market_cap: row.market_cap,
        volume_24h: row.volume_24h,
        source: SourceKind::Csv,
        ingested_at: raw.ingested_at,
    })
}

fn required_id(id: Option<&str>) -> Result<String, SkipReason> {
    match id.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(SkipReason::MissingCoinId),
    }
}

fn validate(record: CanonicalRecord) -> Result<CanonicalRecord, SkipReason> {
    for (field, value) in [
        ("price_usd", record.price_usd),
        ("market_cap", record.market_cap),
        ("volume_24h", record.volume_24h),
    ] {
        if let Some(value) = value {
            if !value.is_finite() || value < 0.0 {
                return Err(SkipReason::InvalidNumber { field, value });
            }
        }
    }
    Ok(record)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{ingestion_timestamp, CoinPaprikaQuote, CoinPaprikaQuotes};

    fn raw(payload: RawPayload) -> RawRecord {
        RawRecord {
            payload,
            raw_json: "{}".to_string(),
            ingested_at: ingestion_timestamp(),
        }
    }

    fn csv(coin_id: &str, price: Option<f64>) -> RawRecord {
        raw(RawPayload::Csv(CsvRow {
            coin_id: coin_id.to_string(),
            name: "Coin".to_string(),
            symbol: "C".to_string(),
            price_usd: price,
            ..Default::default()
        }))
    }

    #[test]
    fn test_coinpaprika_reads_usd_quote() {
        let record = raw(RawPayload::CoinPaprika(CoinPaprikaTicker {
            id: Some("btc-bitcoin".to_string()),
            name: Some("Bitcoin".to_string()),
            symbol: Some("BTC".to_string()),
            quotes: CoinPaprikaQuotes {
                usd: Some(CoinPaprikaQuote {
                    price: Some(45000.0),
                    market_cap: Some(8.5e11),
                    volume_24h: None,
                    percent_change_24h: Some(-3.0),
                }),
            },
            ..Default::default()
        }));

        let canonical = transform(&record).unwrap();

        assert_eq!(canonical.coin_id, "btc-bitcoin");
        assert_eq!(canonical.price_usd, Some(45000.0));
        assert_eq!(canonical.market_cap, Some(8.5e11));
        assert_eq!(canonical.volume_24h, None);
        assert_eq!(canonical.source, SourceKind::CoinPaprika);
        assert_eq!(canonical.ingested_at, record.ingested_at);
    }

    #[test]
    fn test_coinpaprika_without_quote_is_unknown_not_zero() {
        let record = raw(RawPayload::CoinPaprika(CoinPaprikaTicker {
            id: Some("new-coin".to_string()),
            ..Default::default()
        }));

        let canonical = transform(&record).unwrap();

        assert_eq!(canonical.price_usd, None);
        assert_eq!(canonical.name, "");
        assert_eq!(canonical.symbol, "");
    }

    #[test]
    fn test_coingecko_field_names() {
        let record = raw(RawPayload::CoinGecko(CoinGeckoMarket {
            id: Some("ethereum".to_string()),
            name: Some("Ethereum".to_string()),
            symbol: Some("eth".to_string()),
            current_price: Some(2500.0),
            market_cap: Some(3.0e11),
            total_volume: Some(1.2e10),
            ..Default::default()
        }));

        let canonical = transform(&record).unwrap();

        assert_eq!(canonical.price_usd, Some(2500.0));
        assert_eq!(canonical.volume_24h, Some(1.2e10));
        assert_eq!(canonical.symbol, "eth");
        assert_eq!(canonical.source, SourceKind::CoinGecko);
    }

    #[test]
    fn test_missing_or_blank_id_is_skipped() {
        let no_id = raw(RawPayload::CoinGecko(CoinGeckoMarket::default()));
        assert_eq!(transform(&no_id), Err(SkipReason::MissingCoinId));
        assert_eq!(transform(&csv("   ", Some(1.0))), Err(SkipReason::MissingCoinId));
    }

    #[test]
    fn test_negative_and_non_finite_values_are_skipped() {
        assert!(matches!(
            transform(&csv("btc", Some(-1.0))),
            Err(SkipReason::InvalidNumber { field: "price_usd", .. })
        ));
        assert!(matches!(
            transform(&csv("btc", Some(f64::INFINITY))),
            Err(SkipReason::InvalidNumber { .. })
        ));
        assert!(transform(&csv("btc", Some(0.0))).is_ok());
    }

    #[test]
    fn test_batch_keeps_survivors_and_reasons() {
        let batch = transform_batch(&[
            csv("btc", Some(45000.0)),
            csv("", Some(1.0)),
            csv("eth", None),
        ]);

        let ids: Vec<_> = batch.records.iter().map(|r| r.coin_id.as_str()).collect();
        assert_eq!(ids, vec!["btc", "eth"]);
        assert_eq!(batch.skipped, vec![(Some(String::new()), SkipReason::MissingCoinId)]);
    }
}

//! Raw and canonical record persistence
//!
//! Raw records are appended to one table per provider. Canonical records are
//! upserted on their natural key `(coin_id, source, ingested_at)`, so
//! re-loading the same observation updates it in place and the latest write
//! wins. Each call runs in a single transaction: either the whole batch is
//! written or nothing is.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coinetl_common::types::{CanonicalRecord, NaturalKey, SourceKind, StoredCanonicalRecord};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{IngestError, Result};
use crate::models::{CoinGeckoMarket, CoinPaprikaTicker, CsvRow, RawPayload, RawRecord};

/// Rows per multi-row INSERT, well under the Postgres bind parameter limit
pub const INSERT_CHUNK_SIZE: usize = 1_000;

const UNIFIED_TABLE: &str = "unified_crypto_data";

/// Storage for ingested records
#[async_trait]
pub trait RecordLoader: Send + Sync {
    /// Append raw records to their per-provider tables. Returns the number
    /// of records written.
    async fn load_raw(&self, records: &[RawRecord]) -> Result<usize>;

    /// Upsert canonical records on their natural key. Returns the number of
    /// input records accepted.
    async fn load_canonical(&self, records: &[CanonicalRecord]) -> Result<usize>;

    /// Stored canonical records, optionally for one source, ordered by id
    async fn list_canonical(&self, source: Option<SourceKind>) -> Result<Vec<StoredCanonicalRecord>>;
}

/// Collapse records sharing a natural key, keeping the last one in the
/// position of the first
pub fn dedupe_latest(records: &[CanonicalRecord]) -> Vec<&CanonicalRecord> {
    let mut positions: HashMap<NaturalKey, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<&CanonicalRecord> = Vec::with_capacity(records.len());

    for record in records {
        match positions.get(&record.natural_key()) {
            Some(&index) => unique[index] = record,
            None => {
                positions.insert(record.natural_key(), unique.len());
                unique.push(record);
            },
        }
    }

    unique
}

/// Postgres-backed record loader
#[derive(Debug, Clone)]
pub struct PgRecordLoader {
    pool: PgPool,
}

impl PgRecordLoader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_coinpaprika(
        tx: &mut Transaction<'_, Postgres>,
        rows: &[(&CoinPaprikaTicker, &RawRecord)],
    ) -> Result<()> {
        for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO raw_coinpaprika (coin_id, name, symbol, rank, price_usd, market_cap, \
                 volume_24h, circulating_supply, total_supply, max_supply, percent_change_24h, \
                 raw_json, ingested_at) ",
            );

            query_builder.push_values(chunk, |mut b, (ticker, raw)| {
                let usd = ticker.quotes.usd.clone().unwrap_or_default();
                b.push_bind(ticker.id.clone().unwrap_or_default())
                    .push_bind(ticker.name.clone())
                    .push_bind(ticker.symbol.clone())
                    .push_bind(ticker.rank)
                    .push_bind(usd.price)
                    .push_bind(usd.market_cap)
                    .push_bind(usd.volume_24h)
                    .push_bind(ticker.circulating_supply)
                    .push_bind(ticker.total_supply)
                    .push_bind(ticker.max_supply)
                    .push_bind(usd.percent_change_24h)
                    .push_bind(raw.raw_json.clone())
                    .push_bind(raw.ingested_at);
            });

            query_builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(|e| IngestError::load("raw_coinpaprika", e))?;
        }
        Ok(())
    }

    async fn insert_coingecko(
        tx: &mut Transaction<'_, Postgres>,
        rows: &[(&CoinGeckoMarket, &RawRecord)],
    ) -> Result<()> {
        for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO raw_coingecko (coin_id, name, symbol, current_price, market_cap, \
                 total_volume, price_change_24h, price_change_percentage_24h, market_cap_rank, \
                 raw_json, ingested_at) ",
            );

            query_builder.push_values(chunk, |mut b, (market, raw)| {
                b.push_bind(market.id.clone().unwrap_or_default())
                    .push_bind(market.name.clone())
                    .push_bind(market.symbol.clone())
                    .push_bind(market.current_price)
                    .push_bind(market.market_cap)
                    .push_bind(market.total_volume)
                    .push_bind(market.price_change_24h)
                    .push_bind(market.price_change_percentage_24h)
                    .push_bind(market.market_cap_rank)
                    .push_bind(raw.raw_json.clone())
                    .push_bind(raw.ingested_at);
            });

            query_builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(|e| IngestError::load("raw_coingecko", e))?;
        }
        Ok(())
    }

    async fn insert_csv(tx: &mut Transaction<'_, Postgres>, rows: &[(&CsvRow, &RawRecord)]) -> Result<()> {
        for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO raw_csv (coin_id, name, symbol, price_usd, market_cap, volume_24h, \
                 raw_json, ingested_at) ",
            );

            query_builder.push_values(chunk, |mut b, (row, raw)| {
                b.push_bind(row.coin_id.clone())
                    .push_bind(row.name.clone())
                    .push_bind(row.symbol.clone())
                    .push_bind(row.price_usd)
                    .push_bind(row.market_cap)
                    .push_bind(row.volume_24h)
                    .push_bind(raw.raw_json.clone())
                    .push_bind(raw.ingested_at);
            });

            query_builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(|e| IngestError::load("raw_csv", e))?;
        }
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CanonicalRow {
    id: i64,
    coin_id: String,
    name: String,
    symbol: String,
    price_usd: Option<f64>,
    market_cap: Option<f64>,
    volume_24h: Option<f64>,
    source: String,
    ingested_at: DateTime<Utc>,
}

impl TryFrom<CanonicalRow> for StoredCanonicalRecord {
    type Error = IngestError;

    fn try_from(row: CanonicalRow) -> Result<Self> {
        Ok(StoredCanonicalRecord {
            id: row.id,
            record: CanonicalRecord {
                source: row.source.parse()?,
                coin_id: row.coin_id,
                name: row.name,
                symbol: row.symbol,
                price_usd: row.price_usd,
                market_cap: row.market_cap,
                volume_24h: row.volume_24h,
                ingested_at: row.ingested_at,
            },
        })
    }
}

#[async_trait]
impl RecordLoader for PgRecordLoader {
    async fn load_raw(&self, records: &[RawRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut paprika = Vec::new();
        let mut gecko = Vec::new();
        let mut csv = Vec::new();
        for record in records {
            match &record.payload {
                RawPayload::CoinPaprika(ticker) => paprika.push((ticker, record)),
                RawPayload::CoinGecko(market) => gecko.push((market, record)),
                RawPayload::Csv(row) => csv.push((row, record)),
            }
        }

        let mut tx = self.pool.begin().await?;
        Self::insert_coinpaprika(&mut tx, &paprika).await?;
        Self::insert_coingecko(&mut tx, &gecko).await?;
        Self::insert_csv(&mut tx, &csv).await?;
        tx.commit().await?;

        debug!(
            coinpaprika = paprika.len(),
            coingecko = gecko.len(),
            csv = csv.len(),
            "Stored raw records"
        );
        Ok(records.len())
    }

    async fn load_canonical(&self, records: &[CanonicalRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let unique = dedupe_latest(records);
        let mut tx = self.pool.begin().await?;

        for chunk in unique.chunks(INSERT_CHUNK_SIZE) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO unified_crypto_data (coin_id, name, symbol, price_usd, market_cap, \
                 volume_24h, source, ingested_at) ",
            );

            query_builder.push_values(chunk, |mut b, record| {
                b.push_bind(record.coin_id.as_str())
                    .push_bind(record.name.as_str())
                    .push_bind(record.symbol.as_str())
                    .push_bind(record.price_usd)
                    .push_bind(record.market_cap)
                    .push_bind(record.volume_24h)
                    .push_bind(record.source.as_str())
                    .push_bind(record.ingested_at);
            });

            query_builder.push(
                " ON CONFLICT (coin_id, source, ingested_at) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 symbol = EXCLUDED.symbol, \
                 price_usd = EXCLUDED.price_usd, \
                 market_cap = EXCLUDED.market_cap, \
                 volume_24h = EXCLUDED.volume_24h",
            );

            query_builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| IngestError::load(UNIFIED_TABLE, e))?;
        }

        tx.commit().await?;

        info!(
            received = records.len(),
            written = unique.len(),
            "Upserted canonical records"
        );
        Ok(records.len())
    }

    async fn list_canonical(&self, source: Option<SourceKind>) -> Result<Vec<StoredCanonicalRecord>> {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, coin_id, name, symbol, price_usd, market_cap, volume_24h, source, ingested_at \
             FROM unified_crypto_data",
        );
        if let Some(source) = source {
            query_builder.push(" WHERE source = ").push_bind(source.as_str());
        }
        query_builder.push(" ORDER BY id");

        let rows: Vec<CanonicalRow> = query_builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(StoredCanonicalRecord::try_from).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::ingestion_timestamp;

    fn record(coin_id: &str, price: f64, at: DateTime<Utc>) -> CanonicalRecord {
        CanonicalRecord {
            coin_id: coin_id.to_string(),
            name: coin_id.to_uppercase(),
            symbol: coin_id.to_uppercase(),
            price_usd: Some(price),
            market_cap: None,
            volume_24h: None,
            source: SourceKind::Csv,
            ingested_at: at,
        }
    }

    #[test]
    fn test_dedupe_keeps_last_occurrence() {
        let at = ingestion_timestamp();
        let records = vec![
            record("btc", 100.0, at),
            record("eth", 10.0, at),
            record("btc", 110.0, at),
        ];

        let unique = dedupe_latest(&records);

        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].coin_id, "btc");
        assert_eq!(unique[0].price_usd, Some(110.0));
        assert_eq!(unique[1].coin_id, "eth");
    }

    #[test]
    fn test_dedupe_distinguishes_timestamps() {
        let at = ingestion_timestamp();
        let later = at + chrono::Duration::seconds(1);
        let records = vec![record("btc", 100.0, at), record("btc", 110.0, later)];

        assert_eq!(dedupe_latest(&records).len(), 2);
    }
}

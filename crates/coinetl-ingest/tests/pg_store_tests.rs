//! Postgres-backed checkpoint store and loader tests
//!
//! Run with a database: `DATABASE_URL=... cargo test -- --ignored`

use chrono::{DateTime, SubsecRound, Utc};
use coinetl_common::types::{CanonicalRecord, CheckpointStatus, SourceKind};
use coinetl_ingest::models::{CoinGeckoMarket, CsvRow, RawPayload, RawRecord};
use coinetl_ingest::{
    CheckpointStore, PgCheckpointStore, PgRecordLoader, RecordLoader, RunOutcome,
};
use sqlx::PgPool;

fn canonical(coin_id: &str, price: f64, at: DateTime<Utc>) -> CanonicalRecord {
    CanonicalRecord {
        coin_id: coin_id.to_string(),
        name: "Bitcoin".to_string(),
        symbol: "BTC".to_string(),
        price_usd: Some(price),
        market_cap: None,
        volume_24h: Some(1.0e9),
        source: SourceKind::CoinGecko,
        ingested_at: at,
    }
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore] // Requires database
async fn test_canonical_upsert_is_idempotent(pool: PgPool) -> anyhow::Result<()> {
    let loader = PgRecordLoader::new(pool.clone());
    let at = now();

    loader.load_canonical(&[canonical("bitcoin", 100.0, at)]).await?;
    loader.load_canonical(&[canonical("bitcoin", 110.0, at)]).await?;

    let stored = loader.list_canonical(Some(SourceKind::CoinGecko)).await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].record.price_usd, Some(110.0));
    assert_eq!(stored[0].record.market_cap, None);
    assert_eq!(stored[0].record.ingested_at, at);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM unified_crypto_data")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 1);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore] // Requires database
async fn test_duplicate_keys_in_one_batch_keep_last(pool: PgPool) -> anyhow::Result<()> {
    let loader = PgRecordLoader::new(pool);
    let at = now();

    let accepted = loader
        .load_canonical(&[
            canonical("bitcoin", 100.0, at),
            canonical("ethereum", 10.0, at),
            canonical("bitcoin", 120.0, at),
        ])
        .await?;

    assert_eq!(accepted, 3);
    let stored = loader.list_canonical(None).await?;
    assert_eq!(stored.len(), 2);
    let bitcoin = stored
        .iter()
        .find(|s| s.record.coin_id == "bitcoin")
        .map(|s| s.record.price_usd);
    assert_eq!(bitcoin, Some(Some(120.0)));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore] // Requires database
async fn test_raw_records_land_in_provider_tables(pool: PgPool) -> anyhow::Result<()> {
    let loader = PgRecordLoader::new(pool.clone());
    let at = now();

    let records = vec![
        RawRecord {
            payload: RawPayload::CoinGecko(CoinGeckoMarket {
                id: Some("bitcoin".to_string()),
                current_price: Some(45000.0),
                ..Default::default()
            }),
            raw_json: r#"{"id":"bitcoin","current_price":45000.0}"#.to_string(),
            ingested_at: at,
        },
        RawRecord {
            payload: RawPayload::Csv(CsvRow {
                coin_id: "btc".to_string(),
                name: "Bitcoin".to_string(),
                symbol: "BTC".to_string(),
                ..Default::default()
            }),
            raw_json: "{}".to_string(),
            ingested_at: at,
        },
    ];

    assert_eq!(loader.load_raw(&records).await?, 2);

    let gecko: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM raw_coingecko")
        .fetch_one(&pool)
        .await?;
    let csv: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM raw_csv")
        .fetch_one(&pool)
        .await?;
    let paprika: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM raw_coinpaprika")
        .fetch_one(&pool)
        .await?;
    assert_eq!((gecko, csv, paprika), (1, 1, 0));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore] // Requires database
async fn test_checkpoint_transitions(pool: PgPool) -> anyhow::Result<()> {
    let store = PgCheckpointStore::new(pool);
    let source = SourceKind::CoinPaprika;

    assert!(store.get(source).await?.is_none());
    assert!(!store.is_running(source).await?);

    store.start_run(source).await?;
    let running = store.get(source).await?.expect("checkpoint created");
    assert_eq!(running.status, CheckpointStatus::Running);
    assert!(store.is_running(source).await?);

    store
        .complete_run(source, 0, 2.5, RunOutcome::Failure("HTTP 503".to_string()))
        .await?;
    assert!(!store.is_running(source).await?);
    let failed = store.get(source).await?.expect("checkpoint kept");
    assert!(failed.is_failed());
    assert_eq!(failed.error_message.as_deref(), Some("HTTP 503"));
    assert_eq!(failed.duration_seconds, Some(2.5));

    store.start_run(source).await?;
    let restarted = store.get(source).await?.expect("checkpoint kept");
    assert!(restarted.is_running());
    assert_eq!(restarted.error_message, None);
    assert!(restarted.last_run_timestamp >= failed.last_run_timestamp);

    store.complete_run(source, 10, 1.0, RunOutcome::Success).await?;
    assert!(!store.is_running(source).await?);
    let done = store.get(source).await?.expect("checkpoint kept");
    assert!(done.is_successful());
    assert_eq!(done.records_processed, 10);
    assert_eq!(done.error_message, None);
    assert_eq!(
        store.last_successful_run(source).await?,
        Some(done.last_run_timestamp)
    );

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore] // Requires database
async fn test_complete_without_checkpoint_is_noop(pool: PgPool) -> anyhow::Result<()> {
    let store = PgCheckpointStore::new(pool);

    store
        .complete_run(SourceKind::Csv, 5, 1.0, RunOutcome::Success)
        .await?;

    assert!(store.get(SourceKind::Csv).await?.is_none());
    assert!(store.list().await?.is_empty());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore] // Requires database
async fn test_list_orders_by_source(pool: PgPool) -> anyhow::Result<()> {
    let store = PgCheckpointStore::new(pool);

    for source in [SourceKind::Csv, SourceKind::CoinPaprika, SourceKind::CoinGecko] {
        store.start_run(source).await?;
    }

    let sources: Vec<_> = store.list().await?.into_iter().map(|c| c.source).collect();
    assert_eq!(sources, vec!["coingecko", "coinpaprika", "csv"]);

    Ok(())
}

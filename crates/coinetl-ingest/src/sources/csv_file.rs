//! Local CSV provider
//!
//! Expected header: `coin_id,name,symbol,price_usd,market_cap,volume_24h`.
//! Cells are trimmed and empty numeric cells read as absent. Rows with the
//! wrong number of fields or unparsable numbers are skipped.

use coinetl_common::types::SourceKind;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::CsvSourceConfig;
use crate::error::{FetchError, SkipReason};
use crate::models::{ingestion_timestamp, CsvRow, RawPayload, RawRecord};

#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(config: &CsvSourceConfig) -> Self {
        Self {
            path: config.file_path.clone(),
        }
    }

    /// Read up to `limit` rows. A missing file yields an empty batch.
    pub async fn fetch(&self, limit: usize) -> Result<Vec<RawRecord>, FetchError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "CSV file not found, nothing to ingest");
                return Ok(Vec::new());
            },
            Err(error) => {
                return Err(FetchError::Io {
                    path: self.path.clone(),
                    error,
                })
            },
        };

        let records = parse_rows(&bytes, limit);
        info!(
            source = "csv",
            path = %self.path.display(),
            count = records.len(),
            "Read CSV rows"
        );
        Ok(records)
    }
}

fn parse_rows(bytes: &[u8], limit: usize) -> Vec<RawRecord> {
    let ingested_at = ingestion_timestamp();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut records = Vec::new();
    for (idx, result) in reader.deserialize::<CsvRow>().enumerate() {
        if records.len() >= limit {
            break;
        }
        // header is line 1
        let line = idx + 2;

        let parsed = result
            .map_err(|e| SkipReason::Malformed(e.to_string()))
            .and_then(|row| {
                serde_json::to_string(&row)
                    .map(|raw_json| (row, raw_json))
                    .map_err(|e| SkipReason::Malformed(e.to_string()))
            });

        match parsed {
            Ok((row, raw_json)) => records.push(RawRecord {
                payload: RawPayload::Csv(row),
                raw_json,
                ingested_at,
            }),
            Err(reason) => {
                warn!(source = %SourceKind::Csv, line, reason = %reason, "Skipping CSV row");
            },
        }
    }

    records
}

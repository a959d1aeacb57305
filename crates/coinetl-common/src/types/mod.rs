//! Common types used across coinetl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoinEtlError;

// ============================================================================
// Sources
// ============================================================================

/// External provider a record was ingested from.
///
/// The string form (`as_str`) is the `source` tag stored on checkpoints and
/// canonical records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    CoinPaprika,
    CoinGecko,
    Csv,
}

impl SourceKind {
    /// Every source, in the fixed order a full ingestion pass runs them.
    pub const ALL: [SourceKind; 3] = [SourceKind::CoinPaprika, SourceKind::CoinGecko, SourceKind::Csv];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::CoinPaprika => "coinpaprika",
            SourceKind::CoinGecko => "coingecko",
            SourceKind::Csv => "csv",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = CoinEtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coinpaprika" => Ok(SourceKind::CoinPaprika),
            "coingecko" => Ok(SourceKind::CoinGecko),
            "csv" => Ok(SourceKind::Csv),
            other => Err(CoinEtlError::UnknownSource(other.to_string())),
        }
    }
}

// ============================================================================
// Checkpoints
// ============================================================================

/// Run state of a source's most recent ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    Running,
    Success,
    Failure,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Running => "running",
            CheckpointStatus::Success => "success",
            CheckpointStatus::Failure => "failure",
        }
    }
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CheckpointStatus {
    type Err = CoinEtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(CheckpointStatus::Running),
            "success" => Ok(CheckpointStatus::Success),
            "failure" => Ok(CheckpointStatus::Failure),
            _ => Err(CoinEtlError::InvalidStatus(s.to_string())),
        }
    }
}

/// Durable record of a source's most recent ingestion run.
///
/// There is exactly one checkpoint per source. It is created by the first
/// run of that source and only ever transitioned afterwards, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Source tag (unique)
    pub source: String,

    /// Current run state
    pub status: CheckpointStatus,

    /// Start time of the most recent run
    pub last_run_timestamp: DateTime<Utc>,

    /// Canonical records handed to storage by the most recent completed run
    pub records_processed: i64,

    /// Wall-clock duration of the most recent completed run
    pub duration_seconds: Option<f64>,

    /// Failure message of the most recent run, cleared when a run starts
    pub error_message: Option<String>,
}

impl Checkpoint {
    /// Check if a run is currently in progress
    pub fn is_running(&self) -> bool {
        self.status == CheckpointStatus::Running
    }

    /// Check if the last run completed successfully
    pub fn is_successful(&self) -> bool {
        self.status == CheckpointStatus::Success
    }

    /// Check if the last run failed
    pub fn is_failed(&self) -> bool {
        self.status == CheckpointStatus::Failure
    }

    /// Get time since the last run started
    pub fn time_since_last_run(&self) -> chrono::Duration {
        Utc::now() - self.last_run_timestamp
    }
}

// ============================================================================
// Canonical Records
// ============================================================================

/// Identity of one canonical observation: `(coin_id, source, ingested_at)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub coin_id: String,
    pub source: SourceKind,
    pub ingested_at: DateTime<Utc>,
}

/// Normalized, source-tagged representation of one market observation.
///
/// Optional numeric fields are `None` when the provider did not report them;
/// an unknown value is never stored as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub coin_id: String,
    pub name: String,
    pub symbol: String,
    pub price_usd: Option<f64>,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
    pub source: SourceKind,
    pub ingested_at: DateTime<Utc>,
}

impl CanonicalRecord {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            coin_id: self.coin_id.clone(),
            source: self.source,
            ingested_at: self.ingested_at,
        }
    }
}

/// Canonical record as exposed by storage, including its row id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCanonicalRecord {
    pub id: i64,
    #[serde(flatten)]
    pub record: CanonicalRecord,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_round_trip_names() {
        for kind in SourceKind::ALL {
            assert_eq!(kind.to_string().parse::<SourceKind>().unwrap(), kind);
        }
        assert_eq!(" CoinGecko ".parse::<SourceKind>().unwrap(), SourceKind::CoinGecko);
        assert!("binance".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_source_kind_fixed_order() {
        assert_eq!(
            SourceKind::ALL.map(|k| k.as_str()),
            ["coinpaprika", "coingecko", "csv"]
        );
    }

    #[test]
    fn test_checkpoint_status_from_str() {
        assert_eq!("running".parse::<CheckpointStatus>().unwrap(), CheckpointStatus::Running);
        assert_eq!("SUCCESS".parse::<CheckpointStatus>().unwrap(), CheckpointStatus::Success);
        assert_eq!("failure".parse::<CheckpointStatus>().unwrap(), CheckpointStatus::Failure);
        assert!("idle".parse::<CheckpointStatus>().is_err());
    }

    #[test]
    fn test_checkpoint_state_helpers() {
        let mut checkpoint = Checkpoint {
            source: "csv".to_string(),
            status: CheckpointStatus::Running,
            last_run_timestamp: Utc::now(),
            records_processed: 0,
            duration_seconds: None,
            error_message: None,
        };

        assert!(checkpoint.is_running());
        assert!(!checkpoint.is_successful());

        checkpoint.status = CheckpointStatus::Failure;
        assert!(checkpoint.is_failed());
        assert!(!checkpoint.is_running());
    }

    #[test]
    fn test_time_since_last_run() {
        let checkpoint = Checkpoint {
            source: "coingecko".to_string(),
            status: CheckpointStatus::Running,
            last_run_timestamp: Utc::now() - chrono::Duration::minutes(90),
            records_processed: 0,
            duration_seconds: None,
            error_message: None,
        };

        let elapsed = checkpoint.time_since_last_run();
        assert!(elapsed >= chrono::Duration::minutes(90));
        assert!(elapsed < chrono::Duration::minutes(91));
    }

    #[test]
    fn test_natural_key_ignores_values() {
        let at = Utc::now();
        let a = CanonicalRecord {
            coin_id: "btc".to_string(),
            name: "Bitcoin".to_string(),
            symbol: "BTC".to_string(),
            price_usd: Some(100.0),
            market_cap: None,
            volume_24h: None,
            source: SourceKind::Csv,
            ingested_at: at,
        };
        let b = CanonicalRecord {
            price_usd: Some(110.0),
            ..a.clone()
        };

        assert_eq!(a.natural_key(), b.natural_key());
    }

    #[test]
    fn test_stored_record_serializes_flat() {
        let stored = StoredCanonicalRecord {
            id: 7,
            record: CanonicalRecord {
                coin_id: "eth".to_string(),
                name: "Ethereum".to_string(),
                symbol: "ETH".to_string(),
                price_usd: None,
                market_cap: None,
                volume_24h: None,
                source: SourceKind::CoinGecko,
                ingested_at: Utc::now(),
            },
        };

        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["coin_id"], "eth");
        assert_eq!(json["source"], "coingecko");
        assert!(json["price_usd"].is_null());
    }
}

//! In-memory checkpoint and record storage
//!
//! Implements [`CheckpointStore`] and [`RecordLoader`] with the same semantics
//! as the Postgres stores, without durability. Used for `--dry-run` and in
//! tests, where failures can also be injected per operation.

use async_trait::async_trait;
use chrono::Utc;
use coinetl_common::types::{
    CanonicalRecord, Checkpoint, CheckpointStatus, NaturalKey, SourceKind, StoredCanonicalRecord,
};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use tracing::warn;

use crate::checkpoint::{CheckpointStore, RunOutcome};
use crate::error::{IngestError, Result};
use crate::loader::{dedupe_latest, RecordLoader};
use crate::models::RawRecord;

#[derive(Debug, Default)]
struct State {
    checkpoints: BTreeMap<String, Checkpoint>,
    raw: Vec<RawRecord>,
    canonical: Vec<StoredCanonicalRecord>,
    index: HashMap<NaturalKey, usize>,
    next_id: i64,
    fail_raw: Option<String>,
    fail_canonical: Option<String>,
    fail_start: Option<String>,
}

/// Volatile store for checkpoints and records
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw records appended so far, in load order
    pub async fn raw_records(&self) -> Vec<RawRecord> {
        self.state.lock().await.raw.clone()
    }

    /// Insert or replace a checkpoint as-is
    pub async fn put_checkpoint(&self, checkpoint: Checkpoint) {
        let mut state = self.state.lock().await;
        state.checkpoints.insert(checkpoint.source.clone(), checkpoint);
    }

    /// Make every subsequent `load_raw` fail with `message`
    pub async fn fail_raw_loads(&self, message: impl Into<String>) {
        self.state.lock().await.fail_raw = Some(message.into());
    }

    /// Make every subsequent `load_canonical` fail with `message`
    pub async fn fail_canonical_loads(&self, message: impl Into<String>) {
        self.state.lock().await.fail_canonical = Some(message.into());
    }

    /// Make every subsequent `start_run` fail with `message`
    pub async fn fail_start_runs(&self, message: impl Into<String>) {
        self.state.lock().await.fail_start = Some(message.into());
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn get(&self, source: SourceKind) -> Result<Option<Checkpoint>> {
        Ok(self.state.lock().await.checkpoints.get(source.as_str()).cloned())
    }

    async fn start_run(&self, source: SourceKind) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(message) = &state.fail_start {
            return Err(IngestError::Database(sqlx::Error::Protocol(message.clone())));
        }

        let now = Utc::now();
        state
            .checkpoints
            .entry(source.as_str().to_string())
            .and_modify(|c| {
                c.status = CheckpointStatus::Running;
                c.last_run_timestamp = now;
                c.error_message = None;
            })
            .or_insert_with(|| Checkpoint {
                source: source.as_str().to_string(),
                status: CheckpointStatus::Running,
                last_run_timestamp: now,
                records_processed: 0,
                duration_seconds: None,
                error_message: None,
            });
        Ok(())
    }

    async fn complete_run(
        &self,
        source: SourceKind,
        records_processed: i64,
        duration_seconds: f64,
        outcome: RunOutcome,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.checkpoints.get_mut(source.as_str()) {
            Some(checkpoint) => {
                checkpoint.status = outcome.status();
                checkpoint.records_processed = records_processed;
                checkpoint.duration_seconds = Some(duration_seconds);
                checkpoint.error_message = outcome.error_message().map(str::to_string);
            },
            None => {
                warn!(
                    source = %source,
                    status = %outcome.status(),
                    "No checkpoint to complete, run result not recorded"
                );
            },
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Checkpoint>> {
        Ok(self.state.lock().await.checkpoints.values().cloned().collect())
    }
}

#[async_trait]
impl RecordLoader for MemoryStore {
    async fn load_raw(&self, records: &[RawRecord]) -> Result<usize> {
        let mut state = self.state.lock().await;
        if let Some(message) = &state.fail_raw {
            return Err(IngestError::load("raw", message));
        }
        state.raw.extend_from_slice(records);
        Ok(records.len())
    }

    async fn load_canonical(&self, records: &[CanonicalRecord]) -> Result<usize> {
        let mut state = self.state.lock().await;
        if let Some(message) = &state.fail_canonical {
            return Err(IngestError::load("unified_crypto_data", message));
        }

        for record in dedupe_latest(records) {
            match state.index.get(&record.natural_key()).copied() {
                Some(position) => state.canonical[position].record = record.clone(),
                None => {
                    state.next_id += 1;
                    let stored = StoredCanonicalRecord {
                        id: state.next_id,
                        record: record.clone(),
                    };
                    let position = state.canonical.len();
                    state.canonical.push(stored);
                    state.index.insert(record.natural_key(), position);
                },
            }
        }

        Ok(records.len())
    }

    async fn list_canonical(&self, source: Option<SourceKind>) -> Result<Vec<StoredCanonicalRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .canonical
            .iter()
            .filter(|stored| source.map_or(true, |s| stored.record.source == s))
            .cloned()
            .collect())
    }
}

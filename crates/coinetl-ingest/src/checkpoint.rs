//! Per-source run checkpoints
//!
//! One checkpoint row per source records the state of its most recent run.
//! The orchestrator reads it as a re-entrancy guard before starting and
//! transitions it at the start and end of every run.
//!
//! The guard is read-then-write and therefore advisory: two processes that
//! check the same source at the same moment can both start. Runs are driven by
//! a single process, so this is accepted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coinetl_common::types::{Checkpoint, CheckpointStatus, SourceKind};
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::error::Result;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failure(String),
}

impl RunOutcome {
    pub fn status(&self) -> CheckpointStatus {
        match self {
            RunOutcome::Success => CheckpointStatus::Success,
            RunOutcome::Failure(_) => CheckpointStatus::Failure,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            RunOutcome::Success => None,
            RunOutcome::Failure(message) => Some(message),
        }
    }
}

/// Durable per-source run state
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Current checkpoint of `source`, if it has ever run
    async fn get(&self, source: SourceKind) -> Result<Option<Checkpoint>>;

    /// Mark `source` running: creates the checkpoint on first use, otherwise
    /// sets status and start time and clears the previous error message
    async fn start_run(&self, source: SourceKind) -> Result<()>;

    /// Record the end of the current run.
    ///
    /// Without an existing checkpoint nothing is written and the inconsistency
    /// is logged.
    async fn complete_run(
        &self,
        source: SourceKind,
        records_processed: i64,
        duration_seconds: f64,
        outcome: RunOutcome,
    ) -> Result<()>;

    /// All checkpoints, ordered by source tag
    async fn list(&self) -> Result<Vec<Checkpoint>>;

    /// True only when a checkpoint exists with status running
    async fn is_running(&self, source: SourceKind) -> Result<bool> {
        Ok(self.get(source).await?.is_some_and(|c| c.is_running()))
    }

    /// Start time of the last run, if that run succeeded
    async fn last_successful_run(&self, source: SourceKind) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .get(source)
            .await?
            .filter(|c| c.is_successful())
            .map(|c| c.last_run_timestamp))
    }
}

/// Postgres-backed checkpoint store
#[derive(Debug, Clone)]
pub struct PgCheckpointStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct CheckpointRow {
    source: String,
    status: String,
    last_run_timestamp: DateTime<Utc>,
    records_processed: i64,
    duration_seconds: Option<f64>,
    error_message: Option<String>,
}

impl TryFrom<CheckpointRow> for Checkpoint {
    type Error = crate::error::IngestError;

    fn try_from(row: CheckpointRow) -> Result<Self> {
        Ok(Checkpoint {
            status: row.status.parse()?,
            source: row.source,
            last_run_timestamp: row.last_run_timestamp,
            records_processed: row.records_processed,
            duration_seconds: row.duration_seconds,
            error_message: row.error_message,
        })
    }
}

const SELECT_CHECKPOINT: &str = r#"
    SELECT source, status, last_run_timestamp, records_processed,
           duration_seconds, error_message
    FROM checkpoints
"#;

impl PgCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn get(&self, source: SourceKind) -> Result<Option<Checkpoint>> {
        let row: Option<CheckpointRow> =
            sqlx::query_as(&format!("{SELECT_CHECKPOINT} WHERE source = $1"))
                .bind(source.as_str())
                .fetch_optional(&self.pool)
                .await?;

        row.map(Checkpoint::try_from).transpose()
    }

    async fn start_run(&self, source: SourceKind) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO checkpoints (source, status, last_run_timestamp, records_processed)
            VALUES ($1, $2, NOW(), 0)
            ON CONFLICT (source)
            DO UPDATE SET
                status = EXCLUDED.status,
                last_run_timestamp = EXCLUDED.last_run_timestamp,
                error_message = NULL,
                updated_at = NOW()
            "#,
        )
        .bind(source.as_str())
        .bind(CheckpointStatus::Running.as_str())
        .execute(&self.pool)
        .await?;

        debug!(source = %source, "Checkpoint marked running");
        Ok(())
    }

    async fn complete_run(
        &self,
        source: SourceKind,
        records_processed: i64,
        duration_seconds: f64,
        outcome: RunOutcome,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE checkpoints
            SET status = $2,
                records_processed = $3,
                duration_seconds = $4,
                error_message = $5,
                updated_at = NOW()
            WHERE source = $1
            "#,
        )
        .bind(source.as_str())
        .bind(outcome.status().as_str())
        .bind(records_processed)
        .bind(duration_seconds)
        .bind(outcome.error_message())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(
                source = %source,
                status = %outcome.status(),
                "No checkpoint to complete, run result not recorded"
            );
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Checkpoint>> {
        let rows: Vec<CheckpointRow> =
            sqlx::query_as(&format!("{SELECT_CHECKPOINT} ORDER BY source"))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Checkpoint::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_outcome_status() {
        assert_eq!(RunOutcome::Success.status(), CheckpointStatus::Success);
        assert_eq!(RunOutcome::Success.error_message(), None);

        let failed = RunOutcome::Failure("boom".to_string());
        assert_eq!(failed.status(), CheckpointStatus::Failure);
        assert_eq!(failed.error_message(), Some("boom"));
    }
}

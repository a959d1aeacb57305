//! Ingestion pass orchestrator
//!
//! Runs each configured source through guard, fetch, raw load, transform and
//! canonical load, recording the outcome on the source's checkpoint. Errors
//! are contained per source: a failing source never stops the others.

use coinetl_common::types::SourceKind;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::checkpoint::{CheckpointStore, RunOutcome};
use crate::error::{IngestError, Result};
use crate::loader::RecordLoader;
use crate::sources::Source;
use crate::transformer::transform_batch;

/// What happened to one source during a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRunOutcome {
    /// Another run was in progress; nothing was touched
    Skipped,
    /// Completed; `records` canonical records were handed to the loader
    Succeeded { records: usize },
    /// Failed; the error was recorded on the checkpoint when possible
    Failed { error: String },
    /// No fetcher is configured for the source
    NotConfigured,
}

/// Drives ingestion passes over a fixed set of sources
pub struct Orchestrator {
    sources: Vec<Source>,
    checkpoints: Arc<dyn CheckpointStore>,
    loader: Arc<dyn RecordLoader>,
    fetch_limit: usize,
}

impl Orchestrator {
    /// Sources run in the order given
    pub fn new(
        sources: Vec<Source>,
        checkpoints: Arc<dyn CheckpointStore>,
        loader: Arc<dyn RecordLoader>,
        fetch_limit: usize,
    ) -> Self {
        Self {
            sources,
            checkpoints,
            loader,
            fetch_limit,
        }
    }

    /// Run every configured source once, sequentially
    pub async fn run_all(&self) {
        info!(sources = self.sources.len(), "Starting ingestion pass");

        let mut succeeded = 0;
        let mut failed = 0;
        let mut skipped = 0;

        for source in &self.sources {
            match self.run_source(source.kind()).await {
                SourceRunOutcome::Succeeded { .. } => succeeded += 1,
                SourceRunOutcome::Failed { .. } => failed += 1,
                SourceRunOutcome::Skipped | SourceRunOutcome::NotConfigured => skipped += 1,
            }
        }

        info!(succeeded, failed, skipped, "Ingestion pass completed");
    }

    /// Run one source end to end. Never fails: every error is logged and,
    /// once the run has started, recorded on the checkpoint.
    pub async fn run_source(&self, kind: SourceKind) -> SourceRunOutcome {
        let Some(source) = self.sources.iter().find(|s| s.kind() == kind) else {
            warn!(source = %kind, "Source is not configured, ignoring");
            return SourceRunOutcome::NotConfigured;
        };

        let span = info_span!("ingest", source = %kind, run_id = %Uuid::new_v4());
        self.run_guarded(source).instrument(span).await
    }

    async fn run_guarded(&self, source: &Source) -> SourceRunOutcome {
        let kind = source.kind();

        match self.checkpoints.get(kind).await {
            Ok(Some(checkpoint)) if checkpoint.is_running() => {
                warn!(
                    source = %kind,
                    running_for_secs = checkpoint.time_since_last_run().num_seconds(),
                    "Source is already running, skipping"
                );
                return SourceRunOutcome::Skipped;
            },
            Ok(_) => {},
            Err(e) => {
                error!(source = %kind, error = %e, "Could not read checkpoint, abandoning run");
                return SourceRunOutcome::Failed {
                    error: e.to_string(),
                };
            },
        }

        if let Err(e) = self.checkpoints.start_run(kind).await {
            error!(source = %kind, error = %e, "Could not start checkpoint, abandoning run");
            return SourceRunOutcome::Failed {
                error: e.to_string(),
            };
        }

        info!(source = %kind, "Starting ingestion");
        let started = Instant::now();
        let result = self.ingest(source).await;
        let duration = started.elapsed().as_secs_f64();

        let (processed, outcome, report) = match result {
            Ok(records) => {
                info!(source = %kind, records, duration_secs = duration, "✓ Ingestion completed");
                (records, RunOutcome::Success, SourceRunOutcome::Succeeded { records })
            },
            Err(e) => {
                let message = e.to_string();
                error!(source = %kind, error = %message, duration_secs = duration, "✗ Ingestion failed");
                (
                    0,
                    RunOutcome::Failure(message.clone()),
                    SourceRunOutcome::Failed { error: message },
                )
            },
        };

        let processed = i64::try_from(processed).unwrap_or(i64::MAX);
        if let Err(e) = self
            .checkpoints
            .complete_run(kind, processed, duration, outcome)
            .await
        {
            error!(source = %kind, error = %e, "Could not record run result on checkpoint");
        }

        report
    }

    /// Fetch, store raw, transform, store canonical. Returns the number of
    /// canonical records handed to the loader.
    async fn ingest(&self, source: &Source) -> Result<usize> {
        let kind = source.kind();

        let raw = source
            .fetch(self.fetch_limit)
            .await
            .map_err(|error| IngestError::Fetch { kind, error })?;

        if raw.is_empty() {
            warn!(source = %kind, "No data fetched");
            return Ok(0);
        }

        let raw_count = self.loader.load_raw(&raw).await?;

        let batch = transform_batch(&raw);
        if !batch.skipped.is_empty() {
            warn!(
                source = %kind,
                fetched = raw.len(),
                skipped = batch.skipped.len(),
                "Some records failed to transform"
            );
        }

        self.loader.load_canonical(&batch.records).await?;

        info!(
            source = %kind,
            raw = raw_count,
            canonical = batch.records.len(),
            "Stored records"
        );
        Ok(batch.records.len())
    }
}

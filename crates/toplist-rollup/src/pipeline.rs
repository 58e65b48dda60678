//! Pipeline driver.
//!
//! Runs one job as an explicit state machine:
//!
//! ```text
//! Starting -> Streaming -> Draining -> Done
//!     \___________\___________\______-> Failed
//! ```
//!
//! The driver pulls documents from the cursor, fans each one out into the
//! batcher, and pauses the cursor whenever the batcher reports the buffer at
//! its high-water mark, resuming only after the drain signal.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use toplist_storage::IndexSpec;
use toplist_types::RollupSettings;

use crate::batcher::{BatcherConfig, RecordBatcher};
use crate::error::RollupError;
use crate::job::JobSpec;
use crate::sink::BulkUpsertSink;
use crate::store::{DocumentStore, IndexOptions};
use crate::transform::fan_out;

/// Fields of the ranking index created on every output collection.
pub const TAG_INDEX_FIELDS: [&str; 2] = ["tagname", "count"];

/// Lifecycle of one job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Starting,
    Streaming,
    Draining,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Starting, Streaming) | (Streaming, Draining) | (Draining, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Summary of a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub job: String,
    pub output_collection: String,
    pub state: PipelineState,
    pub documents_read: u64,
    /// Documents that produced no records
    pub documents_skipped: u64,
    pub records_produced: u64,
    pub batches_flushed: u64,
    pub records_inserted: u64,
    pub insert_failures: u64,
    /// Batches whose delete phase failed
    pub delete_failures: u64,
    /// Times the cursor was paused for backpressure
    pub pauses: u64,
    pub duration_ms: u64,
}

impl JobReport {
    fn new(spec: &JobSpec) -> Self {
        Self {
            job: spec.name.clone(),
            output_collection: spec.output_collection.clone(),
            state: PipelineState::Starting,
            documents_read: 0,
            documents_skipped: 0,
            records_produced: 0,
            batches_flushed: 0,
            records_inserted: 0,
            insert_failures: 0,
            delete_failures: 0,
            pauses: 0,
            duration_ms: 0,
        }
    }
}

/// Drives one job from cursor to output collection.
pub struct PipelineDriver {
    spec: JobSpec,
    store: Arc<dyn DocumentStore>,
    settings: RollupSettings,
    state: PipelineState,
    report: JobReport,
}

impl PipelineDriver {
    pub fn new(spec: JobSpec, store: Arc<dyn DocumentStore>, settings: RollupSettings) -> Self {
        let report = JobReport::new(&spec);
        Self {
            spec,
            store,
            settings,
            state: PipelineState::Starting,
            report,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) -> Result<(), RollupError> {
        if !self.state.can_transition_to(next) {
            return Err(RollupError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(job = %self.spec.name, from = ?self.state, to = ?next, "Pipeline transition");
        self.state = next;
        self.report.state = next;
        Ok(())
    }

    /// Run the job to completion. Resolves exactly once.
    pub async fn run(mut self) -> Result<JobReport, RollupError> {
        let started = Instant::now();
        info!(
            job = %self.spec.name,
            collection = %self.spec.output_collection,
            "Rollup started"
        );

        let result = self.execute().await;
        self.report.duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                self.transition(PipelineState::Done)?;
                info!(
                    job = %self.spec.name,
                    collection = %self.spec.output_collection,
                    total = self.report.records_produced,
                    inserted = self.report.records_inserted,
                    insert_failures = self.report.insert_failures,
                    duration_ms = self.report.duration_ms,
                    "Rollup generated"
                );
                Ok(self.report)
            }
            Err(e) => {
                if !self.state.is_terminal() {
                    self.state = PipelineState::Failed;
                    self.report.state = PipelineState::Failed;
                }
                error!(
                    job = %self.spec.name,
                    collection = %self.spec.output_collection,
                    total = self.report.records_produced,
                    error = %e,
                    "Rollup failed"
                );
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<(), RollupError> {
        let output = self.store.collection(&self.spec.output_collection);

        // Index creation never blocks or fails the job
        let index_target = output.clone();
        tokio::spawn(async move {
            let spec = IndexSpec::new(&TAG_INDEX_FIELDS);
            if let Err(e) = index_target
                .ensure_index(&spec, IndexOptions { background: true })
                .await
            {
                warn!(collection = %index_target.name(), error = %e, "Index creation failed");
            }
        });

        let mut cursor = self
            .store
            .find(
                &self.spec.source_collection,
                &self.spec.filter,
                &self.spec.projection,
            )
            .await
            .map_err(|e| self.cursor_error(e))?;

        let sink = BulkUpsertSink::new(output, self.settings.continue_on_error);
        let batcher = RecordBatcher::new(sink, BatcherConfig::from(&self.settings));
        let high_water_mark = batcher.high_water_mark();

        self.transition(PipelineState::Streaming)?;
        while let Some(next) = cursor.next_document().await {
            let doc = next.map_err(|e| self.cursor_error(e))?;
            self.report.documents_read += 1;

            let records = fan_out(&doc, &self.spec.tag_source);
            if records.is_empty() {
                self.report.documents_skipped += 1;
                continue;
            }

            let mut saturated = false;
            for record in records {
                self.report.records_produced += 1;
                saturated |= !batcher.write(record);
            }

            if saturated || batcher.buffered() > high_water_mark {
                if batcher.has_failed() {
                    break;
                }
                cursor.pause();
                self.report.pauses += 1;
                debug!(
                    collection = %self.spec.output_collection,
                    buffered = batcher.buffered(),
                    "Cursor paused"
                );
                batcher.drained().await;
                cursor.resume();
            }
            if batcher.has_failed() {
                break;
            }
        }

        self.transition(PipelineState::Draining)?;
        let stats = batcher.end().await?;
        self.report.batches_flushed = stats.batches_flushed as u64;
        self.report.records_inserted = stats.records_inserted as u64;
        self.report.insert_failures = stats.insert_failures as u64;
        self.report.delete_failures = stats.delete_failures as u64;
        Ok(())
    }

    fn cursor_error(&self, err: RollupError) -> RollupError {
        match err {
            RollupError::Cursor { .. } => err,
            other => RollupError::Cursor {
                collection: self.spec.output_collection.clone(),
                message: other.to_string(),
            },
        }
    }
}

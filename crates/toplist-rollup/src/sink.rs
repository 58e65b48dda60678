//! Bulk upsert sink: replace-by-id writes of whole batches.
//!
//! Every batch is applied as delete-by-id-set followed by an insert, so
//! applying the same batch twice leaves the collection as applying it once.

use std::sync::Arc;

use tracing::{debug, warn};

use toplist_types::TagRecord;

use crate::error::RollupError;
use crate::store::{InsertOptions, OutputCollection, WriteConcern};

/// What happened to one applied batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Records in the batch
    pub records: usize,
    /// Existing records removed before the insert
    pub removed: usize,
    pub inserted: usize,
    /// Records the collection refused
    pub insert_failures: usize,
    /// Whether the delete phase failed
    pub delete_failed: bool,
}

/// Applies batches to one output collection.
pub struct BulkUpsertSink {
    collection: Arc<dyn OutputCollection>,
    continue_on_error: bool,
}

impl BulkUpsertSink {
    /// With `continue_on_error` unset, any write error fails the batch.
    pub fn new(collection: Arc<dyn OutputCollection>, continue_on_error: bool) -> Self {
        Self {
            collection,
            continue_on_error,
        }
    }

    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    fn fatal(&self, message: String) -> RollupError {
        RollupError::Sink {
            collection: self.collection.name().to_string(),
            message,
        }
    }

    /// Replace the batch's ids in the output collection.
    pub async fn apply(&self, batch: &[TagRecord]) -> Result<BatchOutcome, RollupError> {
        let mut outcome = BatchOutcome {
            records: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return Ok(outcome);
        }
        let name = self.collection.name();
        let ids: Vec<String> = batch.iter().map(|r| r.id.clone()).collect();

        match self.collection.remove_ids(&ids).await {
            Ok(removed) => outcome.removed = removed,
            Err(e) if self.continue_on_error => {
                warn!(collection = %name, error = %e, "Delete phase failed, inserting anyway");
                outcome.delete_failed = true;
            }
            Err(e) => return Err(self.fatal(format!("delete failed: {}", e))),
        }

        let options = InsertOptions {
            continue_on_error: self.continue_on_error,
            write_concern: WriteConcern::Unacknowledged,
        };
        match self.collection.insert_many(batch, options).await {
            Ok(report) => {
                outcome.inserted = report.inserted;
                outcome.insert_failures = report.failures.len();
                for failure in &report.failures {
                    debug!(
                        collection = %name,
                        id = ?failure.id,
                        reason = %failure.reason,
                        "Record rejected"
                    );
                }
                if !report.failures.is_empty() {
                    if !self.continue_on_error {
                        return Err(self.fatal(format!(
                            "{} of {} records rejected",
                            report.failures.len(),
                            batch.len()
                        )));
                    }
                    warn!(
                        collection = %name,
                        failed = report.failures.len(),
                        records = batch.len(),
                        "Some records were not inserted"
                    );
                }
            }
            Err(e) if self.continue_on_error => {
                warn!(collection = %name, error = %e, records = batch.len(), "Insert failed");
                outcome.insert_failures = batch.len();
            }
            Err(e) => return Err(self.fatal(format!("insert failed: {}", e))),
        }

        debug!(
            collection = %name,
            records = outcome.records,
            removed = outcome.removed,
            inserted = outcome.inserted,
            "Applied batch"
        );
        Ok(outcome)
    }
}

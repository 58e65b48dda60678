//! Scheduled toplist rollups.
//!
//! One cron job enqueues every configured rollup target on the shared
//! [`JobQueue`], waits for all of them, and stores a run record per target.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use toplist_rollup::JobSpec;
use toplist_storage::Storage;
use toplist_types::{RollupSettings, RollupTarget, Settings};

use crate::jitter::JitterConfig;
use crate::queue::{join, JobQueue};
use crate::runs::{save_run, RunRecord};
use crate::{SchedulerError, SchedulerService};

/// Registry name of the scheduled rollup job.
pub const ROLLUP_JOB_NAME: &str = "toplist_rollup";

/// Queue every target, wait for all of them and record their outcomes.
///
/// Targets run concurrently up to the queue's limit. A target whose
/// arguments are invalid fails on its own without affecting the others.
pub async fn run_targets(
    queue: &JobQueue,
    targets: &[RollupTarget],
    settings: &RollupSettings,
    storage: Option<&Storage>,
) -> Vec<RunRecord> {
    let started_at = Utc::now();
    let handles: Vec<_> = targets
        .iter()
        .map(|target| {
            let handle = JobSpec::for_target(target, settings)
                .map(|spec| queue.queue_rollup(spec, settings.clone()));
            (target.label(), handle)
        })
        .collect();

    let mut records = Vec::with_capacity(handles.len());
    for (label, handle) in handles {
        let result = match handle {
            Ok(handle) => join(handle).await,
            Err(e) => Err(SchedulerError::from(e)),
        };
        let record = RunRecord::new(label, started_at, &result);
        if let Some(storage) = storage {
            if let Err(e) = save_run(storage, &record) {
                warn!(job = %record.job, error = %e, "Failed to save run record");
            }
        }
        records.push(record);
    }
    records
}

/// Register the periodic rollup of every configured target.
///
/// # Errors
///
/// Returns error if the cron expression or timezone is invalid.
pub async fn create_rollup_job(
    scheduler: &SchedulerService,
    queue: JobQueue,
    storage: Arc<Storage>,
    settings: &Settings,
) -> Result<uuid::Uuid, SchedulerError> {
    let targets = Arc::new(settings.schedule.targets.clone());
    let rollup = Arc::new(settings.rollup.clone());

    scheduler
        .register_job(
            ROLLUP_JOB_NAME,
            &settings.schedule.cron,
            Some(&settings.schedule.timezone),
            JitterConfig::new(settings.schedule.jitter_secs),
            move |token| {
                let queue = queue.clone();
                let storage = storage.clone();
                let targets = targets.clone();
                let rollup = rollup.clone();
                async move {
                    if token.is_cancelled() {
                        return Ok(());
                    }
                    info!(targets = targets.len(), "Queueing scheduled rollups");
                    let records = run_targets(&queue, &targets, &rollup, Some(storage.as_ref())).await;
                    let failed: Vec<&str> = records
                        .iter()
                        .filter(|r| !r.succeeded())
                        .map(|r| r.job.as_str())
                        .collect();
                    if failed.is_empty() {
                        Ok(())
                    } else {
                        Err(format!("failed rollups: {}", failed.join(", ")))
                    }
                }
            },
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use toplist_rollup::{DocumentStore, RocksDocumentStore};

    use crate::runs::{load_runs, RunOutcome};
    use crate::SchedulerConfig;

    fn setup() -> (Arc<Storage>, JobQueue, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp_dir.path()).unwrap());
        let store: Arc<dyn DocumentStore> = Arc::new(RocksDocumentStore::new(storage.clone(), 50));
        (storage, JobQueue::new(store, 2), temp_dir)
    }

    #[tokio::test]
    async fn test_run_targets_records_each_outcome() {
        let (storage, queue, _temp) = setup();
        storage
            .put_document(
                "book",
                &json!({"_id": "s1", "raters": 40, "tags": [{"name": "fiction", "count": 30}]}),
            )
            .unwrap();

        let targets = vec![
            RollupTarget::subjects("book"),
            RollupTarget::users("book", ""),
            RollupTarget::subjects("music"),
        ];
        let records = run_targets(&queue, &targets, &RollupSettings::default(), Some(storage.as_ref())).await;

        assert_eq!(records.len(), 3);
        match &records[0].outcome {
            RunOutcome::Succeeded { report } => assert_eq!(report.records_inserted, 1),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(matches!(
            &records[1].outcome,
            RunOutcome::Failed { error } if error.contains("status is required")
        ));
        assert!(records[2].succeeded());

        assert_eq!(load_runs(&storage).unwrap().len(), 3);
        assert_eq!(storage.count_documents("top_book_by_tag").unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_rollup_job_registers() {
        let (storage, queue, _temp) = setup();
        let scheduler = SchedulerService::new(SchedulerConfig::default())
            .await
            .unwrap();
        let settings = Settings::default();

        let uuid = create_rollup_job(&scheduler, queue, storage, &settings)
            .await
            .unwrap();
        assert!(!uuid.is_nil());
        let status = scheduler.registry().get_status(ROLLUP_JOB_NAME).unwrap();
        assert_eq!(status.cron_expr, "0 0 4 * * *");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_rollup_job_rejects_bad_cron() {
        let (storage, queue, _temp) = setup();
        let scheduler = SchedulerService::new(SchedulerConfig::default())
            .await
            .unwrap();
        let mut settings = Settings::default();
        settings.schedule.cron = "every night".to_string();

        let result = create_rollup_job(&scheduler, queue, storage, &settings).await;
        assert!(matches!(result, Err(SchedulerError::InvalidCron(_))));
    }
}

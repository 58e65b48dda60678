//! Error types for the scheduler crate.
//!
//! Covers cron expression validation, timezone parsing, scheduler lifecycle
//! and the rollup jobs run through the queue.

use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

use toplist_rollup::RollupError;
use toplist_storage::StorageError;

/// Errors that can occur during scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Error from the underlying tokio-cron-scheduler
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Invalid cron expression
    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid timezone string
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Scheduler is already running
    #[error("Scheduler is already running")]
    AlreadyRunning,

    /// Scheduler is not running
    #[error("Scheduler is not running")]
    NotRunning,

    /// The job queue stopped accepting work
    #[error("Job queue closed")]
    QueueClosed,

    /// A queued task panicked or was aborted
    #[error("Queued job aborted: {0}")]
    Aborted(String),

    /// A rollup job failed
    #[error(transparent)]
    Rollup(#[from] RollupError),

    /// Reading or writing run records failed
    #[error("Run record error: {0}")]
    RunRecord(String),
}

impl From<JobSchedulerError> for SchedulerError {
    fn from(err: JobSchedulerError) -> Self {
        SchedulerError::Scheduler(err.to_string())
    }
}

impl From<StorageError> for SchedulerError {
    fn from(err: StorageError) -> Self {
        SchedulerError::RunRecord(err.to_string())
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::RunRecord(err.to_string())
    }
}

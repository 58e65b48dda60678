//! Job queue and cron scheduling for toplist rollups.
//!
//! Rollup jobs run through a [`JobQueue`] that bounds how many are active at
//! once and never lets two jobs write the same output collection together.
//! [`SchedulerService`] wraps `tokio-cron-scheduler` with timezone support,
//! overlap skipping, jitter and graceful shutdown.
//!
//! # Example
//!
//! ```ignore
//! use toplist_scheduler::{create_rollup_job, JobQueue, SchedulerConfig, SchedulerService};
//!
//! let scheduler = SchedulerService::new(SchedulerConfig::from(&settings.schedule)).await?;
//! let queue = JobQueue::new(store, settings.queue.concurrency);
//! create_rollup_job(&scheduler, queue, storage, &settings).await?;
//!
//! scheduler.start().await?;
//! ```

mod config;
mod error;
mod jitter;
pub mod jobs;
mod queue;
mod registry;
mod runs;
mod scheduler;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use jitter::JitterConfig;
pub use jobs::{create_rollup_job, run_targets, ROLLUP_JOB_NAME};
pub use queue::{join, JobQueue};
pub use registry::{JobRegistry, JobResult, JobStatus};
pub use runs::{load_runs, save_run, RunOutcome, RunRecord};
pub use scheduler::{validate_cron_expression, SchedulerService};

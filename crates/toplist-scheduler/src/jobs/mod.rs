//! Jobs registered with the scheduler.
//!
//! - **rollup**: periodic rollup of every configured target through the queue

pub mod rollup;

pub use rollup::{create_rollup_job, run_targets, ROLLUP_JOB_NAME};

//! Job registry for tracking scheduled job status.
//!
//! Tracks, per registered job, the last run time, duration and result, and
//! how often it ran and failed. The scheduler consults it to skip a tick
//! while the previous one is still running.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a job execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobResult {
    /// Job completed successfully
    Success,
    /// Job failed with an error message
    Failed(String),
    /// Tick skipped because the previous run was still active
    Skipped(String),
}

/// Status of a registered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_name: String,
    /// Cron expression for the job schedule
    pub cron_expr: String,
    /// When the job last finished (if ever)
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_result: Option<JobResult>,
    pub run_count: u64,
    pub error_count: u64,
    pub is_running: bool,
}

impl JobStatus {
    pub fn new(job_name: String, cron_expr: String) -> Self {
        Self {
            job_name,
            cron_expr,
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            run_count: 0,
            error_count: 0,
            is_running: false,
        }
    }
}

/// Thread-safe registry of job status.
///
/// # Example
///
/// ```
/// use toplist_scheduler::{JobRegistry, JobResult};
///
/// let registry = JobRegistry::new();
/// registry.register("toplist_rollup", "0 0 4 * * *");
///
/// assert!(registry.try_start("toplist_rollup"));
/// assert!(!registry.try_start("toplist_rollup"));
///
/// registry.record_complete("toplist_rollup", JobResult::Success, 1500);
/// assert!(!registry.is_running("toplist_rollup"));
/// ```
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a job. Re-registering a name resets its status.
    pub fn register(&self, job_name: &str, cron_expr: &str) {
        self.write().insert(
            job_name.to_string(),
            JobStatus::new(job_name.to_string(), cron_expr.to_string()),
        );
    }

    /// Mark a job running unless it already is.
    ///
    /// Returns `false` when the job is running or not registered.
    pub fn try_start(&self, job_name: &str) -> bool {
        let mut jobs = self.write();
        match jobs.get_mut(job_name) {
            Some(status) if !status.is_running => {
                status.is_running = true;
                true
            }
            _ => false,
        }
    }

    /// Record that a job has completed.
    pub fn record_complete(&self, job_name: &str, result: JobResult, duration_ms: u64) {
        let mut jobs = self.write();
        if let Some(status) = jobs.get_mut(job_name) {
            // A skipped tick leaves the running instance alone
            if !matches!(result, JobResult::Skipped(_)) {
                status.is_running = false;
            }
            status.last_run = Some(Utc::now());
            status.last_duration_ms = Some(duration_ms);
            status.run_count += 1;
            if matches!(result, JobResult::Failed(_)) {
                status.error_count += 1;
            }
            status.last_result = Some(result);
        }
    }

    /// Returns `None` if the job is not registered.
    pub fn get_status(&self, job_name: &str) -> Option<JobStatus> {
        self.read().get(job_name).cloned()
    }

    /// Status of every job, ordered by name.
    pub fn get_all_status(&self) -> Vec<JobStatus> {
        let mut all: Vec<JobStatus> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.job_name.cmp(&b.job_name));
        all
    }

    pub fn is_running(&self, job_name: &str) -> bool {
        self.read()
            .get(job_name)
            .map(|s| s.is_running)
            .unwrap_or(false)
    }

    pub fn any_running(&self) -> bool {
        self.read().values().any(|s| s.is_running)
    }

    pub fn job_count(&self) -> usize {
        self.read().len()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_register_and_get() {
        let registry = JobRegistry::new();
        registry.register("rollup", "0 0 4 * * *");

        let status = registry.get_status("rollup").unwrap();
        assert_eq!(status.job_name, "rollup");
        assert_eq!(status.cron_expr, "0 0 4 * * *");
        assert_eq!(status.run_count, 0);
        assert!(!status.is_running);
    }

    #[test]
    fn test_try_start_prevents_overlap() {
        let registry = JobRegistry::new();
        registry.register("rollup", "0 0 4 * * *");

        assert!(registry.try_start("rollup"));
        assert!(registry.is_running("rollup"));
        assert!(!registry.try_start("rollup"));

        registry.record_complete("rollup", JobResult::Success, 10);
        assert!(registry.try_start("rollup"));
    }

    #[test]
    fn test_record_failure_counts_errors() {
        let registry = JobRegistry::new();
        registry.register("rollup", "0 0 4 * * *");
        registry.try_start("rollup");

        registry.record_complete("rollup", JobResult::Failed("cursor died".into()), 5000);

        let status = registry.get_status("rollup").unwrap();
        assert_eq!(status.run_count, 1);
        assert_eq!(status.error_count, 1);
        assert_eq!(status.last_duration_ms, Some(5000));
        assert_eq!(
            status.last_result,
            Some(JobResult::Failed("cursor died".into()))
        );
    }

    #[test]
    fn test_skip_keeps_running_flag() {
        let registry = JobRegistry::new();
        registry.register("rollup", "0 0 4 * * *");
        registry.try_start("rollup");

        registry.record_complete("rollup", JobResult::Skipped("overlap".into()), 0);

        let status = registry.get_status("rollup").unwrap();
        assert!(status.is_running);
        assert_eq!(status.error_count, 0);
    }

    #[test]
    fn test_unknown_job() {
        let registry = JobRegistry::new();
        assert!(registry.get_status("unknown").is_none());
        assert!(!registry.is_running("unknown"));
        assert!(!registry.try_start("unknown"));
        registry.record_complete("unknown", JobResult::Success, 100);
        assert_eq!(registry.job_count(), 0);
    }

    #[test]
    fn test_all_status_sorted() {
        let registry = JobRegistry::new();
        registry.register("b", "0 0 * * * *");
        registry.register("a", "0 30 * * * *");
        let names: Vec<String> = registry
            .get_all_status()
            .into_iter()
            .map(|s| s.job_name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(!registry.any_running());
    }
}

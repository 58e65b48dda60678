//! Scheduler service wrapper around tokio-cron-scheduler.
//!
//! Registers timezone-aware cron jobs, skips a tick while the previous one
//! is still running, and shuts down after giving running jobs a chance to
//! finish.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::jitter::JitterConfig;
use crate::registry::{JobRegistry, JobResult};
use crate::{SchedulerConfig, SchedulerError};

/// Validate a 6-field cron expression
/// (second minute hour day-of-month month day-of-week).
///
/// ```
/// use toplist_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("0 0 4 * * *").is_ok());
/// assert!(validate_cron_expression("invalid").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    match Job::new_async(expr, |_uuid, _lock| Box::pin(async {})) {
        Ok(_) => Ok(()),
        Err(e) => Err(SchedulerError::InvalidCron(format!("'{}': {}", expr, e))),
    }
}

/// Lifecycle wrapper around [`JobScheduler`].
pub struct SchedulerService {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    shutdown_token: CancellationToken,
    is_running: AtomicBool,
}

impl SchedulerService {
    /// Create the scheduler. Call `start()` to begin firing jobs.
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.parse_timezone()?;
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            config,
            registry: Arc::new(JobRegistry::new()),
            shutdown_token: CancellationToken::new(),
            is_running: AtomicBool::new(false),
        })
    }

    /// # Errors
    ///
    /// Returns `SchedulerError::AlreadyRunning` if already started.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.scheduler.start().await?;
        info!("Scheduler started");
        Ok(())
    }

    /// Cancel the shutdown token, wait up to `shutdown_timeout_secs` for
    /// running jobs, then stop the scheduler.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NotRunning` if the scheduler is not started.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!("Initiating scheduler shutdown");
        self.shutdown_token.cancel();

        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.shutdown_timeout_secs);
        while self.registry.any_running() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if self.registry.any_running() {
            warn!("Shutdown timeout reached with jobs still running");
        }

        if let Err(e) = self.scheduler.shutdown().await {
            warn!("Error during scheduler shutdown: {}", e);
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Scheduler shutdown complete");
        Ok(())
    }

    /// Cancelled when shutdown begins. Jobs should stop queueing work once
    /// it fires.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register a cron job.
    ///
    /// A tick that fires while the previous run is still active is skipped
    /// and recorded as such. Each run starts after a random delay bounded by
    /// `jitter`, and its result and duration go to the registry.
    ///
    /// # Arguments
    ///
    /// * `name` - Registry key and log label
    /// * `cron_expr` - 6-field cron expression
    /// * `timezone` - IANA timezone, or None for the configured default
    /// * `job_fn` - Called with the shutdown token on every tick
    pub async fn register_job<F, Fut>(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Option<&str>,
        jitter: JitterConfig,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send,
    {
        let tz: Tz = match timezone {
            Some(tz_str) => Self::parse_timezone(tz_str)?,
            None => self.config.parse_timezone()?,
        };
        validate_cron_expression(cron_expr)?;

        self.registry.register(name, cron_expr);
        let job_name = name.to_string();
        let registry = self.registry.clone();
        let shutdown_token = self.shutdown_token.clone();

        let job = Job::new_async_tz(cron_expr, tz, move |_uuid, _lock| {
            let name = job_name.clone();
            let registry = registry.clone();
            let token = shutdown_token.clone();
            let job_fn = job_fn.clone();

            Box::pin(async move {
                if token.is_cancelled() {
                    return;
                }
                if !registry.try_start(&name) {
                    info!(job = %name, "Previous run still active, skipping tick");
                    registry.record_complete(&name, JobResult::Skipped("overlap".to_string()), 0);
                    return;
                }

                let delay = jitter.generate_jitter();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                info!(job = %name, "Job started");
                let start = std::time::Instant::now();
                let result = match job_fn(token).await {
                    Ok(()) => JobResult::Success,
                    Err(e) => {
                        warn!(job = %name, error = %e, "Job failed");
                        JobResult::Failed(e)
                    }
                };
                let duration_ms = start.elapsed().as_millis() as u64;
                info!(job = %name, duration_ms, "Job completed");
                registry.record_complete(&name, result, duration_ms);
            })
        })
        .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;

        let uuid = self.scheduler.add(job).await?;
        info!(job = %name, uuid = %uuid, cron = %cron_expr, timezone = %tz.name(), "Job registered");
        Ok(uuid)
    }

    pub fn parse_timezone(tz_str: &str) -> Result<Tz, SchedulerError> {
        tz_str
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(tz_str.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn quick_config() -> SchedulerConfig {
        SchedulerConfig {
            shutdown_timeout_secs: 1,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scheduler_start_stop() {
        let mut scheduler = SchedulerService::new(quick_config()).await.unwrap();
        assert!(!scheduler.is_running());

        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(
            scheduler.start().await,
            Err(SchedulerError::AlreadyRunning)
        ));

        let token = scheduler.shutdown_token();
        scheduler.shutdown().await.unwrap();
        assert!(!scheduler.is_running());
        assert!(token.is_cancelled());
        assert!(matches!(
            scheduler.shutdown().await,
            Err(SchedulerError::NotRunning)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_timezone_config() {
        let config = SchedulerConfig {
            default_timezone: "Invalid/Zone".to_string(),
            ..Default::default()
        };
        let result = SchedulerService::new(config).await;
        assert!(matches!(result, Err(SchedulerError::InvalidTimezone(_))));
    }

    #[test]
    fn test_validate_cron_expression() {
        assert!(validate_cron_expression("0 0 4 * * *").is_ok());
        assert!(validate_cron_expression("*/10 * * * * *").is_ok());
        assert!(validate_cron_expression("0 0 0 * * SUN").is_ok());

        assert!(validate_cron_expression("invalid").is_err());
        assert!(validate_cron_expression("").is_err());
        assert!(validate_cron_expression("* * *").is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_job_records_runs() {
        let mut scheduler = SchedulerService::new(quick_config()).await.unwrap();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let uuid = scheduler
            .register_job(
                "tick",
                "* * * * * *",
                None,
                JitterConfig::default(),
                move |_token| {
                    let c = counter_clone.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
            )
            .await
            .unwrap();
        assert!(!uuid.is_nil());
        assert!(scheduler.registry().get_status("tick").is_some());

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        scheduler.shutdown().await.unwrap();

        assert!(counter.load(Ordering::SeqCst) >= 1);
        let status = scheduler.registry().get_status("tick").unwrap();
        assert!(status.run_count >= 1);
        assert_eq!(status.last_result, Some(JobResult::Success));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_job_invalid_inputs() {
        let scheduler = SchedulerService::new(SchedulerConfig::default())
            .await
            .unwrap();

        let result = scheduler
            .register_job("bad", "invalid-cron", None, JitterConfig::default(), |_t| async {
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(SchedulerError::InvalidCron(_))));

        let result = scheduler
            .register_job(
                "bad-tz",
                "0 0 * * * *",
                Some("Invalid/Timezone"),
                JitterConfig::default(),
                |_t| async { Ok(()) },
            )
            .await;
        assert!(matches!(result, Err(SchedulerError::InvalidTimezone(_))));
    }
}

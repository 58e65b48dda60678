//! Configuration loading for toplist.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/toplist/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ToplistError;

/// Tuning and source-selection settings for rollup jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupSettings {
    /// Records per bulk write.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Flush a partial batch after this long without a flush (ms).
    /// Keeps sparse rollups moving when the size trigger is never reached.
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,

    /// Buffered records (open + queued + in-flight) above which the source
    /// cursor is paused until the batcher drains.
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,

    /// Documents fetched per cursor page.
    #[serde(default = "default_cursor_page_size")]
    pub cursor_page_size: usize,

    /// Log and count write errors instead of failing the job.
    #[serde(default = "default_continue_on_error")]
    pub continue_on_error: bool,

    /// Collection holding user documents.
    #[serde(default = "default_user_collection")]
    pub user_collection: String,

    /// Only users whose last sync ended with this status are rolled up.
    #[serde(default = "default_synced_status")]
    pub synced_status: String,

    /// Users need strictly more finished items than this to qualify.
    #[serde(default = "default_min_user_done")]
    pub min_user_done: i64,

    /// Subjects need strictly more raters than this to qualify.
    #[serde(default = "default_min_subject_raters")]
    pub min_subject_raters: i64,
}

fn default_batch_size() -> usize {
    5000
}

fn default_flush_timeout_ms() -> u64 {
    5000
}

fn default_high_water_mark() -> usize {
    10_000
}

fn default_cursor_page_size() -> usize {
    500
}

fn default_continue_on_error() -> bool {
    true
}

fn default_user_collection() -> String {
    "user".to_string()
}

fn default_synced_status() -> String {
    "succeed".to_string()
}

fn default_min_user_done() -> i64 {
    20
}

fn default_min_subject_raters() -> i64 {
    10
}

impl Default for RollupSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_timeout_ms: default_flush_timeout_ms(),
            high_water_mark: default_high_water_mark(),
            cursor_page_size: default_cursor_page_size(),
            continue_on_error: default_continue_on_error(),
            user_collection: default_user_collection(),
            synced_status: default_synced_status(),
            min_user_done: default_min_user_done(),
            min_subject_raters: default_min_subject_raters(),
        }
    }
}

impl RollupSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be > 0".to_string());
        }
        if self.flush_timeout_ms == 0 {
            return Err("flush_timeout_ms must be > 0".to_string());
        }
        if self.high_water_mark < self.batch_size {
            return Err(format!(
                "high_water_mark ({}) must be >= batch_size ({})",
                self.high_water_mark, self.batch_size
            ));
        }
        if self.cursor_page_size == 0 {
            return Err("cursor_page_size must be > 0".to_string());
        }
        if self.user_collection.is_empty() {
            return Err("user_collection must not be empty".to_string());
        }
        Ok(())
    }
}

/// Job queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Maximum rollup jobs running at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    4
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

/// One rollup to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RollupTarget {
    /// Users' top tags for a namespace and collection status
    Users { namespace: String, status: String },
    /// Subjects' tags for a namespace
    Subjects { namespace: String },
}

impl RollupTarget {
    pub fn users(namespace: impl Into<String>, status: impl Into<String>) -> Self {
        RollupTarget::Users {
            namespace: namespace.into(),
            status: status.into(),
        }
    }

    pub fn subjects(namespace: impl Into<String>) -> Self {
        RollupTarget::Subjects {
            namespace: namespace.into(),
        }
    }

    /// Short label for logs and job names, e.g. `users:book:all`.
    pub fn label(&self) -> String {
        match self {
            RollupTarget::Users { namespace, status } => format!("users:{}:{}", namespace, status),
            RollupTarget::Subjects { namespace } => format!("subjects:{}", namespace),
        }
    }
}

/// Periodic rollup schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// 6-field cron expression (default: 4 AM daily)
    #[serde(default = "default_cron")]
    pub cron: String,

    /// IANA timezone for the cron expression
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Rollups enqueued on every tick
    #[serde(default = "default_targets")]
    pub targets: Vec<RollupTarget>,

    /// Random delay before each tick, up to this many seconds (0 = none)
    #[serde(default)]
    pub jitter_secs: u64,

    /// How long shutdown waits for running rollups
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_cron() -> String {
    "0 0 4 * * *".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_targets() -> Vec<RollupTarget> {
    let mut targets = Vec::new();
    for ns in ["book", "music", "movie"] {
        targets.push(RollupTarget::users(ns, "all"));
        targets.push(RollupTarget::users(ns, "done"));
        targets.push(RollupTarget::subjects(ns));
    }
    targets
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            cron: default_cron(),
            timezone: default_timezone(),
            targets: default_targets(),
            jitter_secs: 0,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB storage directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub rollup: RollupSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub schedule: ScheduleSettings,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "toplist")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            rollup: RollupSettings::default(),
            queue: QueueSettings::default(),
            schedule: ScheduleSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/toplist/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (TOPLIST_*, nested keys joined by `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ToplistError> {
        let config_dir = ProjectDirs::from("", "", "toplist")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| ToplistError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| ToplistError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // e.g. TOPLIST_DB_PATH, TOPLIST_ROLLUP__BATCH_SIZE, TOPLIST_QUEUE__CONCURRENCY
        builder = builder.add_source(
            Environment::with_prefix("TOPLIST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| ToplistError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| ToplistError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ToplistError> {
        self.rollup
            .validate()
            .map_err(|e| ToplistError::Config(format!("rollup: {}", e)))?;
        if self.queue.concurrency == 0 {
            return Err(ToplistError::Config(
                "queue: concurrency must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
                return home.join(rest);
            }
        }
        PathBuf::from(&self.db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.rollup.batch_size, 5000);
        assert_eq!(settings.rollup.flush_timeout_ms, 5000);
        assert_eq!(settings.rollup.high_water_mark, 10_000);
        assert_eq!(settings.queue.concurrency, 4);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_with_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.queue.concurrency, 4);
    }

    #[test]
    fn test_rollup_validation() {
        let mut rollup = RollupSettings::default();
        assert!(rollup.validate().is_ok());

        rollup.batch_size = 0;
        assert!(rollup.validate().is_err());

        rollup.batch_size = 100;
        rollup.high_water_mark = 50;
        assert!(rollup.validate().is_err());

        rollup.high_water_mark = 100;
        rollup.flush_timeout_ms = 0;
        assert!(rollup.validate().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut settings = Settings::default();
        settings.queue.concurrency = 0;
        assert!(matches!(settings.validate(), Err(ToplistError::Config(_))));
    }

    #[test]
    fn test_target_labels() {
        assert_eq!(RollupTarget::users("book", "all").label(), "users:book:all");
        assert_eq!(RollupTarget::subjects("music").label(), "subjects:music");
    }

    #[test]
    fn test_targets_from_toml() {
        let toml = r#"
            cron = "0 30 3 * * *"
            [[targets]]
            kind = "users"
            namespace = "book"
            status = "wish"
            [[targets]]
            kind = "subjects"
            namespace = "movie"
        "#;
        let schedule: ScheduleSettings = Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(schedule.cron, "0 30 3 * * *");
        assert_eq!(schedule.timezone, "UTC");
        assert_eq!(
            schedule.targets,
            vec![
                RollupTarget::users("book", "wish"),
                RollupTarget::subjects("movie")
            ]
        );
    }

    #[test]
    fn test_default_targets_cover_namespaces() {
        let schedule = ScheduleSettings::default();
        assert_eq!(schedule.targets.len(), 9);
        assert!(schedule.targets.contains(&RollupTarget::subjects("book")));
    }
}

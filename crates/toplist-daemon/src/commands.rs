//! Command implementations for the toplist binary.
//!
//! Handles:
//! - import: load JSON documents into a collection
//! - run: execute rollups through the job queue
//! - schedule: run configured rollups on their cron schedule
//! - top / stats / history / show-config: read-only inspection

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::signal;
use tracing::{info, warn};

use toplist_rollup::{
    subjects_output_collection, users_output_collection, DocumentStore, RocksDocumentStore,
    TAG_INDEX_FIELDS,
};
use toplist_scheduler::{
    create_rollup_job, load_runs, run_targets, JobQueue, RunOutcome, RunRecord, SchedulerConfig,
    SchedulerService,
};
use toplist_storage::{IndexSpec, Storage};
use toplist_types::{RollupTarget, Settings};

use crate::cli::RunCommands;

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    db_path_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(db_path) = db_path_override {
        settings.db_path = db_path.to_string();
    }
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    Ok(settings)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `log_level`.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Open the configured RocksDB directory, creating parents as needed.
pub fn open_storage(settings: &Settings) -> Result<Arc<Storage>> {
    let db_path = settings.expanded_db_path();
    info!("Opening storage at {:?}", db_path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let storage = Storage::open(&db_path).context("Failed to open storage")?;
    Ok(Arc::new(storage))
}

/// Parse a JSON array, a single object, or one object per line.
pub fn parse_documents(contents: &str) -> Result<Vec<Value>> {
    let trimmed = contents.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("Invalid JSON array");
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(vec![value]);
    }

    let mut docs = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let doc = serde_json::from_str(line)
            .with_context(|| format!("Invalid JSON on line {}", i + 1))?;
        docs.push(doc);
    }
    Ok(docs)
}

/// Store every document of `path` in `collection`. Returns how many were stored.
pub fn import_documents(storage: &Storage, collection: &str, path: &Path) -> Result<usize> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let docs = parse_documents(&contents)?;
    for (i, doc) in docs.iter().enumerate() {
        storage
            .put_document(collection, doc)
            .with_context(|| format!("Document {} of {:?}", i + 1, path))?;
    }
    storage.flush().context("Failed to flush storage")?;
    info!(collection, count = docs.len(), "Imported documents");
    Ok(docs.len())
}

pub fn handle_import(settings: &Settings, collection: &str, file: &str) -> Result<()> {
    let storage = open_storage(settings)?;
    let count = import_documents(&storage, collection, Path::new(file))?;
    println!("Imported {} documents into {}", count, collection);
    Ok(())
}

/// Targets selected by a `run` subcommand.
pub fn run_command_targets(command: &RunCommands, settings: &Settings) -> Vec<RollupTarget> {
    match command {
        RunCommands::Users { namespace, status } => {
            vec![RollupTarget::users(namespace.as_str(), status.as_str())]
        }
        RunCommands::Subjects { namespace } => vec![RollupTarget::subjects(namespace.as_str())],
        RunCommands::All => settings.schedule.targets.clone(),
    }
}

fn document_store(storage: &Arc<Storage>, settings: &Settings) -> Arc<dyn DocumentStore> {
    Arc::new(RocksDocumentStore::new(
        storage.clone(),
        settings.rollup.cursor_page_size,
    ))
}

/// Run the selected rollups through the queue and print one line per target.
pub async fn handle_run(settings: &Settings, command: RunCommands) -> Result<()> {
    let storage = open_storage(settings)?;
    let queue = JobQueue::new(document_store(&storage, settings), settings.queue.concurrency);
    let targets = run_command_targets(&command, settings);

    let records = run_targets(&queue, &targets, &settings.rollup, Some(storage.as_ref())).await;
    storage.flush().context("Failed to flush storage")?;

    for record in &records {
        println!("{}", format_run(record));
    }
    let failed = records.iter().filter(|r| !r.succeeded()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} rollups failed", failed, records.len());
    }
    Ok(())
}

/// Run the scheduler until Ctrl+C or SIGTERM.
pub async fn start_scheduler(settings: &Settings) -> Result<()> {
    let storage = open_storage(settings)?;
    let queue = JobQueue::new(document_store(&storage, settings), settings.queue.concurrency);

    let mut scheduler = SchedulerService::new(SchedulerConfig::from(&settings.schedule))
        .await
        .context("Failed to create scheduler")?;
    create_rollup_job(&scheduler, queue.clone(), storage.clone(), settings)
        .await
        .context("Failed to register rollup job")?;

    info!(
        cron = %settings.schedule.cron,
        timezone = %settings.schedule.timezone,
        targets = settings.schedule.targets.len(),
        "Scheduler configured"
    );
    scheduler.start().await.context("Failed to start scheduler")?;

    shutdown_signal().await?;

    queue.close();
    scheduler.shutdown().await.context("Scheduler shutdown failed")?;
    if let Err(e) = storage.flush() {
        warn!(error = %e, "Failed to flush storage on shutdown");
    }
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("Failed to install Ctrl+C handler")?;
                info!("Received Ctrl+C, shutting down...");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("Failed to install Ctrl+C handler")?;
        info!("Received Ctrl+C, shutting down...");
    }

    Ok(())
}

/// Output collection queried by `top`.
pub fn top_collection(namespace: &str, status: Option<&str>) -> String {
    match status {
        Some(status) => users_output_collection(namespace, status),
        None => subjects_output_collection(namespace),
    }
}

/// Records of `collection` for `tag`, highest count first.
pub fn top_records(
    storage: &Storage,
    collection: &str,
    tag: &str,
    limit: usize,
) -> Result<Vec<Value>> {
    let spec = IndexSpec::new(&TAG_INDEX_FIELDS);
    storage
        .query_index(collection, &spec, &[Value::from(tag)], limit, true)
        .with_context(|| format!("Failed to query {}", collection))
}

pub fn show_top(
    settings: &Settings,
    namespace: &str,
    status: Option<&str>,
    tag: &str,
    limit: usize,
) -> Result<()> {
    let storage = open_storage(settings)?;
    let collection = top_collection(namespace, status);
    let records = top_records(&storage, &collection, tag, limit)?;

    if records.is_empty() {
        println!("No records for tag '{}' in {}", tag, collection);
        return Ok(());
    }
    println!("{} / {}", collection, tag);
    for (i, record) in records.iter().enumerate() {
        let id = record.get("_id").and_then(Value::as_str).unwrap_or("?");
        let count = record.get("count").and_then(Value::as_i64).unwrap_or(0);
        println!("{:>4}. {:<40} {}", i + 1, id, count);
    }
    Ok(())
}

pub fn show_stats(settings: &Settings) -> Result<()> {
    let storage = open_storage(settings)?;
    let stats = storage.get_stats().context("Failed to read stats")?;

    println!("Database: {}", settings.expanded_db_path().display());
    println!("  Documents:     {}", stats.document_count);
    println!("  Indexes:       {}", stats.index_count);
    println!("  Index entries: {}", stats.index_entry_count);
    println!("  Job runs:      {}", stats.job_run_count);

    let collections = storage
        .collection_stats()
        .context("Failed to read collection stats")?;
    if !collections.is_empty() {
        println!("Collections:");
        for (name, count) in collections {
            println!("  {:<36} {}", name, count);
        }
    }
    Ok(())
}

/// One-line summary of a run.
pub fn format_run(record: &RunRecord) -> String {
    let started = record.started_at.format("%Y-%m-%d %H:%M:%S");
    match &record.outcome {
        RunOutcome::Succeeded { report } => format!(
            "{} ok     {} read={} skipped={} records={} inserted={} failed={} ({} ms) -> {}",
            started,
            record.job,
            report.documents_read,
            report.documents_skipped,
            report.records_produced,
            report.records_inserted,
            report.insert_failures,
            record.duration_ms,
            report.output_collection,
        ),
        RunOutcome::Failed { error } => {
            format!("{} FAILED {} ({} ms): {}", started, record.job, record.duration_ms, error)
        }
    }
}

pub fn show_history(settings: &Settings) -> Result<()> {
    let storage = open_storage(settings)?;
    let runs = load_runs(&storage).context("Failed to read run history")?;
    if runs.is_empty() {
        println!("No rollups have run yet");
        return Ok(());
    }
    for record in &runs {
        println!("{}", format_run(record));
    }
    Ok(())
}

pub fn show_config(settings: &Settings) -> Result<()> {
    let rendered = toml::to_string_pretty(settings).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}

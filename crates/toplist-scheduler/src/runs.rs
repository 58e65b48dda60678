//! Persisted run records.
//!
//! The latest outcome of every rollup target is kept in storage under the
//! target's label, so `history` survives restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use toplist_rollup::JobReport;
use toplist_storage::Storage;

use crate::SchedulerError;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded { report: JobReport },
    Failed { error: String },
}

/// Latest run of one rollup target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub job: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: RunOutcome,
}

impl RunRecord {
    pub fn new(
        job: impl Into<String>,
        started_at: DateTime<Utc>,
        result: &Result<JobReport, SchedulerError>,
    ) -> Self {
        let finished = Utc::now();
        let outcome = match result {
            Ok(report) => RunOutcome::Succeeded {
                report: report.clone(),
            },
            Err(e) => RunOutcome::Failed {
                error: e.to_string(),
            },
        };
        Self {
            job: job.into(),
            started_at,
            duration_ms: (finished - started_at).num_milliseconds().max(0) as u64,
            outcome,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, RunOutcome::Succeeded { .. })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Store `record` as the latest run of its job.
pub fn save_run(storage: &Storage, record: &RunRecord) -> Result<(), SchedulerError> {
    storage.put_job_run(&record.job, &record.to_bytes()?)?;
    Ok(())
}

/// All stored run records, ordered by job. Unreadable records are skipped.
pub fn load_runs(storage: &Storage) -> Result<Vec<RunRecord>, SchedulerError> {
    let mut records = Vec::new();
    for (job, bytes) in storage.list_job_runs()? {
        match RunRecord::from_bytes(&bytes) {
            Ok(record) => records.push(record),
            Err(e) => warn!(job = %job, error = %e, "Skipping unreadable run record"),
        }
    }
    Ok(records)
}

//! The two rollup job variants and their entry points.
//!
//! - users by tag: each qualifying user's `<ns>_stats.<status>.top_tags`
//!   into `top_<ns>_<status>_user_by_tag`
//! - subjects by tag: each qualifying subject's `tags` into `top_<ns>_by_tag`

use std::sync::Arc;

use toplist_types::{RollupSettings, RollupTarget};

use crate::error::RollupError;
use crate::pipeline::{JobReport, PipelineDriver};
use crate::store::{DocumentStore, Filter, Projection};
use crate::transform::TagSource;

/// Output collection of the users-by-tag rollup.
pub fn users_output_collection(namespace: &str, status: &str) -> String {
    format!("top_{}_{}_user_by_tag", namespace, status)
}

/// Output collection of the subjects-by-tag rollup.
pub fn subjects_output_collection(namespace: &str) -> String {
    format!("top_{}_by_tag", namespace)
}

fn require(name: &str, value: &str) -> Result<String, RollupError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RollupError::Parameter(format!("{} is required", name)));
    }
    Ok(value.to_string())
}

/// Everything one job run needs to know about its source and output.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    /// Label used in logs and run records, e.g. `users:book:all`
    pub name: String,
    pub source_collection: String,
    pub filter: Filter,
    pub projection: Projection,
    pub tag_source: TagSource,
    pub output_collection: String,
}

impl JobSpec {
    /// Users who synced successfully and finished more than
    /// `min_user_done` items in the namespace.
    pub fn users_by_tag(
        namespace: &str,
        status: &str,
        settings: &RollupSettings,
    ) -> Result<Self, RollupError> {
        let namespace = require("namespace", namespace)?;
        let status = require("status", status)?;
        let tag_source = TagSource::user_top_tags(&namespace, &status);

        Ok(Self {
            name: RollupTarget::users(namespace.as_str(), status.as_str()).label(),
            source_collection: settings.user_collection.clone(),
            filter: Filter::new()
                .eq("last_synced_status", settings.synced_status.as_str())
                .gt(format!("{}_stats.n_done", namespace), settings.min_user_done),
            projection: Projection::new(&[tag_source.projection_path()]),
            output_collection: users_output_collection(&namespace, &status),
            tag_source,
        })
    }

    /// Subjects of the namespace with more than `min_subject_raters` raters.
    pub fn subjects_by_tag(namespace: &str, settings: &RollupSettings) -> Result<Self, RollupError> {
        let namespace = require("namespace", namespace)?;
        let tag_source = TagSource::SubjectTags;

        Ok(Self {
            name: RollupTarget::subjects(namespace.as_str()).label(),
            filter: Filter::new().gt("raters", settings.min_subject_raters),
            projection: Projection::new(&[tag_source.projection_path()]),
            output_collection: subjects_output_collection(&namespace),
            source_collection: namespace,
            tag_source,
        })
    }

    pub fn for_target(target: &RollupTarget, settings: &RollupSettings) -> Result<Self, RollupError> {
        match target {
            RollupTarget::Users { namespace, status } => {
                Self::users_by_tag(namespace, status, settings)
            }
            RollupTarget::Subjects { namespace } => Self::subjects_by_tag(namespace, settings),
        }
    }
}

/// Run a prepared job against `store`.
pub async fn run_job(
    store: Arc<dyn DocumentStore>,
    spec: JobSpec,
    settings: &RollupSettings,
) -> Result<JobReport, RollupError> {
    settings.validate().map_err(RollupError::Config)?;
    PipelineDriver::new(spec, store, settings.clone()).run().await
}

/// Roll users' top tags for `namespace`/`status` into
/// `top_<ns>_<status>_user_by_tag`.
///
/// Fails with [`RollupError::Parameter`] before touching the store when
/// either argument is empty.
pub async fn run_users_by_tag(
    store: Arc<dyn DocumentStore>,
    namespace: &str,
    status: &str,
    settings: &RollupSettings,
) -> Result<JobReport, RollupError> {
    let spec = JobSpec::users_by_tag(namespace, status, settings)?;
    run_job(store, spec, settings).await
}

/// Roll subjects' tags for `namespace` into `top_<ns>_by_tag`.
pub async fn run_subjects_by_tag(
    store: Arc<dyn DocumentStore>,
    namespace: &str,
    settings: &RollupSettings,
) -> Result<JobReport, RollupError> {
    let spec = JobSpec::subjects_by_tag(namespace, settings)?;
    run_job(store, spec, settings).await
}

/// Run whichever variant `target` names.
pub async fn run_target(
    store: Arc<dyn DocumentStore>,
    target: &RollupTarget,
    settings: &RollupSettings,
) -> Result<JobReport, RollupError> {
    let spec = JobSpec::for_target(target, settings)?;
    run_job(store, spec, settings).await
}

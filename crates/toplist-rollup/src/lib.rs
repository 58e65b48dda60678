//! Streaming tag rollups.
//!
//! Reads source documents through a cursor, fans each one out into
//! `(entity, tag, count)` records and writes them in batches to an output
//! collection, pausing the cursor whenever the write side falls behind.
//!
//! ## Key Components
//!
//! - [`fan_out`]: one document to its ordered [`TagRecord`](toplist_types::TagRecord)s
//! - [`RecordBatcher`]: size/timeout batching with a high-water mark and drain signal
//! - [`BulkUpsertSink`]: idempotent delete-then-insert batch writes
//! - [`PipelineDriver`]: the per-job state machine tying them together
//! - [`DocumentStore`]: the store seam, implemented for RocksDB by [`RocksDocumentStore`]
//!
//! ## Example
//!
//! ```ignore
//! use toplist_rollup::{run_users_by_tag, RocksDocumentStore};
//!
//! let store = Arc::new(RocksDocumentStore::new(storage, settings.cursor_page_size));
//! let report = run_users_by_tag(store, "book", "all", &settings).await?;
//! println!("{} records", report.records_produced);
//! ```

pub mod batcher;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod rocks;
pub mod sink;
pub mod store;
pub mod transform;

pub use batcher::{BatcherConfig, BatcherStats, RecordBatcher};
pub use error::RollupError;
pub use job::{
    run_job, run_subjects_by_tag, run_target, run_users_by_tag, subjects_output_collection,
    users_output_collection, JobSpec,
};
pub use pipeline::{JobReport, PipelineDriver, PipelineState, TAG_INDEX_FIELDS};
pub use rocks::{RocksCollection, RocksCursor, RocksDocumentStore};
pub use sink::{BatchOutcome, BulkUpsertSink};
pub use store::{
    Condition, DocumentCursor, DocumentStore, Filter, IndexOptions, InsertOptions, InsertReport,
    OutputCollection, Projection, RecordFailure, WriteConcern,
};
pub use transform::{fan_out, TagSource};

//! Storage layer for toplist.
//!
//! Provides a RocksDB-backed document store with:
//! - Named collections of JSON documents keyed by `_id`
//! - Paged, id-ordered scans for streaming cursors
//! - Delete-by-id-set and continue-on-error inserts for replace-by-id writes
//! - Compound secondary indexes maintained on every write
//! - Persisted job run records

pub mod column_families;
pub mod db;
pub mod error;
pub mod index;
pub mod keys;

pub use db::{InsertFailure, InsertOutcome, Storage, StorageStats, WriteMode};
pub use error::StorageError;
pub use index::{IndexMeta, IndexSpec, IndexState};
pub use keys::{DocumentKey, IndexEntryKey, JobRunKey};

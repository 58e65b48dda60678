//! # toplist-types
//!
//! Shared domain types for the toplist rollup system.
//!
//! This crate defines the data structures every other crate agrees on:
//! - [`SourceDocument`]: a read-only document from the upstream store
//! - [`TagRecord`]: one flattened `(entity, tag, count)` rollup row
//! - [`Settings`]: layered configuration for storage, rollups and scheduling
//!
//! ## Usage
//!
//! ```rust
//! use serde_json::json;
//! use toplist_types::{SourceDocument, TagRecord};
//!
//! let doc = SourceDocument::from_value(json!({"_id": "u1", "tags": []})).unwrap();
//! assert_eq!(doc.id, "u1");
//!
//! let record = TagRecord::at_rank(&doc.id, 0, "scifi", 5);
//! assert_eq!(record.id, "u1::0");
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod record;

pub use config::{
    QueueSettings, RollupSettings, RollupTarget, ScheduleSettings, Settings,
};
pub use document::{field_path, field_path_dotted, SourceDocument};
pub use error::ToplistError;
pub use record::TagRecord;

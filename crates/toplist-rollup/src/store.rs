//! Store seams used by rollup jobs.
//!
//! A job only sees three narrow interfaces: a [`DocumentStore`] that opens
//! cursors and hands out output collections, the [`DocumentCursor`] it
//! streams from, and the [`OutputCollection`] it writes to. The RocksDB
//! implementations live in [`crate::rocks`]; tests use in-memory mocks.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use toplist_storage::IndexSpec;
use toplist_types::{field_path_dotted, SourceDocument, TagRecord};

use crate::error::RollupError;

/// Comparison applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value
    Eq(Value),
    /// Field is strictly greater than the value (numbers or strings)
    Gt(Value),
}

/// Conjunction of field conditions over dotted paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<(String, Condition)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((path.into(), Condition::Eq(value.into())));
        self
    }

    pub fn gt(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((path.into(), Condition::Gt(value.into())));
        self
    }

    /// Whether `doc` satisfies every condition. A missing field fails.
    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|(path, condition)| {
            let Some(field) = field_path_dotted(doc, path) else {
                return false;
            };
            match condition {
                Condition::Eq(expected) => values_equal(field, expected),
                Condition::Gt(bound) => compare(field, bound) == Some(Ordering::Greater),
            }
        })
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Dotted paths to keep from each document. `_id` is always kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub paths: Vec<String>,
}

impl Projection {
    pub fn new<S: AsRef<str>>(paths: &[S]) -> Self {
        Self {
            paths: paths.iter().map(|p| p.as_ref().to_string()).collect(),
        }
    }

    /// Copy `_id` and every present projected path into a new document.
    /// An empty projection keeps the whole document.
    pub fn apply(&self, doc: &Value) -> Value {
        if self.paths.is_empty() {
            return doc.clone();
        }
        let mut out = Map::new();
        if let Some(id) = doc.get("_id") {
            out.insert("_id".to_string(), id.clone());
        }
        for path in &self.paths {
            if let Some(value) = field_path_dotted(doc, path) {
                insert_path(&mut out, path, value.clone());
            }
        }
        Value::Object(out)
    }
}

fn insert_path(out: &mut Map<String, Value>, path: &str, value: Value) {
    let mut parts = path.split('.').peekable();
    let mut current = out;
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            current.insert(part.to_string(), value);
            return;
        }
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        match entry {
            Value::Object(map) => current = map,
            _ => return,
        }
    }
}

/// Write acknowledgement level for inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteConcern {
    Acknowledged,
    /// Fire-and-forget: the write is not confirmed durable
    Unacknowledged,
}

/// Options for [`OutputCollection::insert_many`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOptions {
    /// Keep inserting after a per-record failure
    pub continue_on_error: bool,
    pub write_concern: WriteConcern,
}

/// Options for [`OutputCollection::ensure_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOptions {
    /// Build without blocking writers
    pub background: bool,
}

/// A record the output collection refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub id: Option<String>,
    pub reason: String,
}

/// Outcome of one insert call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub inserted: usize,
    pub failures: Vec<RecordFailure>,
}

/// Pull-based cursor over source documents.
///
/// `None` marks the end of data. An `Err` is the cursor's single error
/// event; callers stop reading after it.
#[async_trait]
pub trait DocumentCursor: Send {
    /// Next document, reading from the store when the local buffer is empty.
    async fn next_document(&mut self) -> Option<Result<SourceDocument, RollupError>>;

    /// Stop fetching from the store until [`DocumentCursor::resume`].
    fn pause(&mut self);

    fn resume(&mut self);
}

/// Collection that receives rollup records.
#[async_trait]
pub trait OutputCollection: Send + Sync {
    fn name(&self) -> &str;

    /// Remove every record whose id is in `ids`. Returns the number removed.
    async fn remove_ids(&self, ids: &[String]) -> Result<usize, RollupError>;

    /// Insert records. Per-record rejections are reported, not returned as
    /// errors.
    async fn insert_many(
        &self,
        records: &[TagRecord],
        options: InsertOptions,
    ) -> Result<InsertReport, RollupError>;

    async fn ensure_index(&self, spec: &IndexSpec, options: IndexOptions)
        -> Result<(), RollupError>;
}

/// Handle to the store a job reads from and writes to.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a cursor over `collection` matching `filter`, shaped by `projection`.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> Result<Box<dyn DocumentCursor>, RollupError>;

    fn collection(&self, name: &str) -> Arc<dyn OutputCollection>;
}

//! End-to-end test infrastructure for toplist.
//!
//! Provides a shared TestHarness and document builders for tests covering
//! the full source-collection-to-ranked-output pipeline on RocksDB.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use toplist_rollup::{DocumentStore, RocksDocumentStore};
use toplist_storage::Storage;
use toplist_types::RollupSettings;

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub storage: Arc<Storage>,
    /// Document store over `storage`, as the jobs see it
    pub store: Arc<dyn DocumentStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_page_size(RollupSettings::default().cursor_page_size)
    }

    /// Harness whose cursors read `page_size` documents at a time.
    pub fn with_page_size(page_size: usize) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let storage =
            Arc::new(Storage::open(temp_dir.path()).expect("Failed to open test storage"));
        let store: Arc<dyn DocumentStore> =
            Arc::new(RocksDocumentStore::new(storage.clone(), page_size));

        Self {
            _temp_dir: temp_dir,
            storage,
            store,
        }
    }

    pub fn insert(&self, collection: &str, docs: &[Value]) {
        for doc in docs {
            self.storage
                .put_document(collection, doc)
                .expect("Failed to put document");
        }
    }

    /// Every document of `collection`, ordered by id.
    pub fn records(&self, collection: &str) -> Vec<Value> {
        let mut all = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let page = self
                .storage
                .scan_documents(collection, after.as_deref(), 100)
                .expect("Failed to scan documents");
            if page.is_empty() {
                return all;
            }
            after = page.last().map(|(id, _)| id.clone());
            all.extend(page.into_iter().map(|(_, doc)| doc));
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A user that passes the users filter, with `tags` as the top tags of
/// `namespace`/`status`.
pub fn user_doc(id: &str, namespace: &str, status: &str, tags: &[(&str, i64)]) -> Value {
    let top_tags: Vec<Value> = tags
        .iter()
        .map(|(tag, count)| json!({"_id": tag, "count": count}))
        .collect();
    json!({
        "_id": id,
        "last_synced_status": "succeed",
        (format!("{}_stats", namespace)): {
            "n_done": 50,
            (status): {"top_tags": top_tags},
        },
    })
}

/// A subject with `raters` raters and the given tags.
pub fn subject_doc(id: &str, raters: i64, tags: &[(&str, i64)]) -> Value {
    let tags: Vec<Value> = tags
        .iter()
        .map(|(name, count)| json!({"name": name, "count": count}))
        .collect();
    json!({"_id": id, "raters": raters, "tags": tags})
}

/// `count` qualifying subjects with `tags_per_subject` random tags each.
/// The same seed always produces the same documents.
pub fn random_subjects(count: usize, tags_per_subject: usize, seed: u64) -> Vec<Value> {
    const TAGS: [&str; 8] = [
        "fiction", "history", "scifi", "drama", "poetry", "travel", "science", "art",
    ];
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let tags: Vec<Value> = (0..tags_per_subject)
                .map(|_| {
                    json!({
                        "name": TAGS[rng.random_range(0..TAGS.len())],
                        "count": rng.random_range(1..1000),
                    })
                })
                .collect();
            json!({
                "_id": format!("s{:04}", i),
                "raters": rng.random_range(11..5000),
                "tags": tags,
            })
        })
        .collect()
}

/// Settings that force many small batches and frequent pauses.
pub fn small_batch_settings() -> RollupSettings {
    RollupSettings {
        batch_size: 5,
        high_water_mark: 10,
        flush_timeout_ms: 50,
        cursor_page_size: 7,
        ..RollupSettings::default()
    }
}

//! RocksDB wrapper for toplist storage.
//!
//! Provides:
//! - Database open with column family setup
//! - Document put/get, id-ordered paged scans and counts per collection
//! - Delete-by-id-set and insert-many with duplicate-key detection
//! - Secondary index registration, background build and ranked lookups
//! - Job run records

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use serde_json::Value;
use tracing::{debug, info};

use toplist_types::document::document_id;

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_DOCUMENTS, CF_INDEX_ENTRIES, CF_INDEX_SPECS,
    CF_JOB_RUNS,
};
use crate::error::StorageError;
use crate::index::{encode_value, IndexMeta, IndexSpec, IndexState};
use crate::keys::{index_spec_key, prefix_upper_bound, DocumentKey, IndexEntryKey, JobRunKey};

/// Index entries written per batch while building an index.
const INDEX_BUILD_CHUNK: usize = 1000;

/// How an insert-many call behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMode {
    /// Keep inserting the remaining documents after a per-document failure.
    /// When false, the insert stops at the first failure (ordered insert).
    pub continue_on_error: bool,
    /// Wait for the write-ahead log. Unacknowledged writes skip it.
    pub acknowledged: bool,
}

impl Default for WriteMode {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            acknowledged: true,
        }
    }
}

impl WriteMode {
    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.disable_wal(!self.acknowledged);
        opts
    }
}

/// A document rejected by an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertFailure {
    /// Position of the document in the insert call
    pub position: usize,
    pub id: Option<String>,
    pub reason: String,
}

/// Result of an insert-many call.
#[derive(Debug, Default, Clone)]
pub struct InsertOutcome {
    pub inserted: usize,
    pub failures: Vec<InsertFailure>,
}

impl InsertOutcome {
    fn fail(&mut self, position: usize, id: Option<String>, reason: impl Into<String>) {
        self.failures.push(InsertFailure {
            position,
            id,
            reason: reason.into(),
        });
    }
}

/// Main storage interface for toplist
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    // ==================== Document Methods ====================

    /// Insert or replace a document, keyed by its `_id`.
    ///
    /// Returns the document id.
    pub fn put_document(&self, collection: &str, doc: &Value) -> Result<String, StorageError> {
        let id = document_id(doc)
            .ok_or_else(|| StorageError::InvalidDocument("missing or invalid _id".to_string()))?;
        let key = DocumentKey::new(collection, &id)?;
        let docs_cf = self.cf(CF_DOCUMENTS)?;
        let entries_cf = self.cf(CF_INDEX_ENTRIES)?;
        let indexes = self.list_indexes(collection)?;

        let mut batch = WriteBatch::default();
        if let Some(old) = self.get_document(collection, &id)? {
            for entry in index_entries(collection, &indexes, &id, &old)? {
                batch.delete_cf(entries_cf, entry);
            }
        }
        batch.put_cf(docs_cf, key.to_bytes(), serde_json::to_vec(doc)?);
        for entry in index_entries(collection, &indexes, &id, doc)? {
            batch.put_cf(entries_cf, entry, []);
        }
        self.db.write(batch)?;

        debug!(collection, id = %id, "Stored document");
        Ok(id)
    }

    /// Get a document by id.
    pub fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>, StorageError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        let key = DocumentKey::new(collection, id)?;
        match self.db.get_cf(cf, key.to_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Read up to `limit` documents of a collection in id order, starting
    /// strictly after `after` (or from the beginning).
    pub fn scan_documents(
        &self,
        collection: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(String, Value)>, StorageError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        let prefix = DocumentKey::collection_prefix(collection)?;
        let start = match after {
            Some(id) => DocumentKey::new(collection, id)?.to_bytes(),
            None => prefix.clone(),
        };

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward));

        let mut results = Vec::new();
        for item in iter {
            if results.len() >= limit {
                break;
            }
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let doc_key = DocumentKey::from_bytes(&key)?;
            if after == Some(doc_key.id.as_str()) {
                continue;
            }
            results.push((doc_key.id, serde_json::from_slice(&value)?));
        }

        Ok(results)
    }

    /// Number of documents in a collection.
    pub fn count_documents(&self, collection: &str) -> Result<usize, StorageError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        let prefix = DocumentKey::collection_prefix(collection)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut count = 0;
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Delete every document of `collection` whose id is in `ids`.
    ///
    /// Unknown ids are ignored. Returns the number of documents removed.
    pub fn delete_documents(&self, collection: &str, ids: &[String]) -> Result<usize, StorageError> {
        let docs_cf = self.cf(CF_DOCUMENTS)?;
        let entries_cf = self.cf(CF_INDEX_ENTRIES)?;
        let indexes = self.list_indexes(collection)?;

        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for id in ids {
            let key = DocumentKey::new(collection, id)?;
            let Some(bytes) = self.db.get_cf(docs_cf, key.to_bytes())? else {
                continue;
            };
            if !indexes.is_empty() {
                let doc: Value = serde_json::from_slice(&bytes)?;
                for entry in index_entries(collection, &indexes, id, &doc)? {
                    batch.delete_cf(entries_cf, entry);
                }
            }
            batch.delete_cf(docs_cf, key.to_bytes());
            removed += 1;
        }

        if removed > 0 {
            self.db.write(batch)?;
            debug!(collection, removed, "Deleted documents");
        }
        Ok(removed)
    }

    /// Insert new documents. A document whose `_id` already exists (in the
    /// collection or earlier in the same call) is rejected as a duplicate key.
    ///
    /// Per-document rejections are reported in the outcome; only storage
    /// failures return `Err`.
    pub fn insert_documents(
        &self,
        collection: &str,
        docs: &[Value],
        mode: WriteMode,
    ) -> Result<InsertOutcome, StorageError> {
        let docs_cf = self.cf(CF_DOCUMENTS)?;
        let entries_cf = self.cf(CF_INDEX_ENTRIES)?;
        let indexes = self.list_indexes(collection)?;
        DocumentKey::collection_prefix(collection)?;

        let mut outcome = InsertOutcome::default();
        let mut seen = HashSet::new();
        let mut batch = WriteBatch::default();

        for (position, doc) in docs.iter().enumerate() {
            let id = match document_id(doc) {
                Some(id) => id,
                None => {
                    outcome.fail(position, None, "missing or invalid _id");
                    if mode.continue_on_error {
                        continue;
                    }
                    break;
                }
            };
            let key = match DocumentKey::new(collection, &id) {
                Ok(key) => key,
                Err(e) => {
                    outcome.fail(position, Some(id), e.to_string());
                    if mode.continue_on_error {
                        continue;
                    }
                    break;
                }
            };
            if !seen.insert(id.clone()) || self.db.get_cf(docs_cf, key.to_bytes())?.is_some() {
                outcome.fail(position, Some(id.clone()), format!("duplicate key: {}", id));
                if mode.continue_on_error {
                    continue;
                }
                break;
            }

            batch.put_cf(docs_cf, key.to_bytes(), serde_json::to_vec(doc)?);
            for entry in index_entries(collection, &indexes, &id, doc)? {
                batch.put_cf(entries_cf, entry, []);
            }
            outcome.inserted += 1;
        }

        if outcome.inserted > 0 {
            self.db.write_opt(batch, &mode.write_options())?;
        }
        debug!(
            collection,
            inserted = outcome.inserted,
            failed = outcome.failures.len(),
            "Inserted documents"
        );
        Ok(outcome)
    }

    /// Document counts per collection, ordered by collection name.
    pub fn collection_stats(&self) -> Result<Vec<(String, usize)>, StorageError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            let doc_key = DocumentKey::from_bytes(&key)?;
            *counts.entry(doc_key.collection).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    // ==================== Index Methods ====================

    /// Indexes registered on a collection.
    pub fn list_indexes(&self, collection: &str) -> Result<Vec<IndexMeta>, StorageError> {
        let cf = self.cf(CF_INDEX_SPECS)?;
        let prefix = DocumentKey::collection_prefix(collection)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut indexes = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            indexes.push(IndexMeta::from_bytes(&value)?);
        }
        Ok(indexes)
    }

    /// Make sure `spec` exists on `collection`, building it over existing
    /// documents if needed.
    ///
    /// The index is registered before the build scan starts, so documents
    /// written concurrently are indexed by the write path. Returns `true`
    /// if a build ran.
    pub fn ensure_index(&self, collection: &str, spec: &IndexSpec) -> Result<bool, StorageError> {
        let specs_cf = self.cf(CF_INDEX_SPECS)?;
        let docs_cf = self.cf(CF_DOCUMENTS)?;
        let entries_cf = self.cf(CF_INDEX_ENTRIES)?;

        let name = spec.name();
        let spec_key = index_spec_key(collection, &name)?;
        if let Some(bytes) = self.db.get_cf(specs_cf, &spec_key)? {
            if IndexMeta::from_bytes(&bytes)?.state == IndexState::Ready {
                debug!(collection, index = %name, "Index already exists");
                return Ok(false);
            }
        }

        let mut meta = IndexMeta::building(spec.clone());
        self.db.put_cf(specs_cf, &spec_key, meta.to_bytes()?)?;
        info!(collection, index = %name, "Building index");

        let prefix = DocumentKey::collection_prefix(collection)?;
        let iter = self
            .db
            .iterator_cf(docs_cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut batch = WriteBatch::default();
        let mut indexed = 0usize;
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let doc_key = DocumentKey::from_bytes(&key)?;
            let doc: Value = serde_json::from_slice(&value)?;
            let entry = IndexEntryKey {
                collection: collection.to_string(),
                index_name: name.clone(),
                values: spec.encode_document(&doc),
                id: doc_key.id,
            };
            batch.put_cf(entries_cf, entry.to_bytes()?, []);
            indexed += 1;
            if batch.len() >= INDEX_BUILD_CHUNK {
                self.db.write(std::mem::take(&mut batch))?;
            }
        }
        if !batch.is_empty() {
            self.db.write(batch)?;
        }

        meta.state = IndexState::Ready;
        self.db.put_cf(specs_cf, &spec_key, meta.to_bytes()?)?;
        info!(collection, index = %name, indexed, "Index ready");
        Ok(true)
    }

    /// Look up documents through an index.
    ///
    /// `prefix` pins the leading index fields by equality; results are
    /// ordered by the remaining fields, highest first when `descending`.
    /// Entries that no longer match their document are skipped.
    pub fn query_index(
        &self,
        collection: &str,
        spec: &IndexSpec,
        prefix: &[Value],
        limit: usize,
        descending: bool,
    ) -> Result<Vec<Value>, StorageError> {
        let specs_cf = self.cf(CF_INDEX_SPECS)?;
        let entries_cf = self.cf(CF_INDEX_ENTRIES)?;

        let name = spec.name();
        if self
            .db
            .get_cf(specs_cf, index_spec_key(collection, &name)?)?
            .is_none()
        {
            return Err(StorageError::IndexNotFound(format!("{}.{}", collection, name)));
        }

        let encoded: Vec<Vec<u8>> = prefix.iter().map(|v| encode_value(Some(v))).collect();
        let key_prefix = IndexEntryKey::prefix(collection, &name, &encoded)?;
        let upper = prefix_upper_bound(&key_prefix);
        let mode = if descending {
            IteratorMode::From(&upper, Direction::Reverse)
        } else {
            IteratorMode::From(&key_prefix, Direction::Forward)
        };

        let mut results = Vec::new();
        for item in self.db.iterator_cf(entries_cf, mode) {
            if results.len() >= limit {
                break;
            }
            let (key, _) = item?;
            if !key.starts_with(&key_prefix) {
                if descending && key.as_ref() >= upper.as_slice() {
                    continue;
                }
                break;
            }
            let id = IndexEntryKey::id_from_bytes(&key)?;
            let Some(doc) = self.get_document(collection, &id)? else {
                continue;
            };
            let current = IndexEntryKey {
                collection: collection.to_string(),
                index_name: name.clone(),
                values: spec.encode_document(&doc),
                id,
            };
            if current.to_bytes()? == key.as_ref() {
                results.push(doc);
            }
        }
        Ok(results)
    }

    // ==================== Job Run Methods ====================

    /// Store the latest run record of a job.
    pub fn put_job_run(&self, job_name: &str, record_bytes: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(CF_JOB_RUNS)?;
        self.db
            .put_cf(cf, JobRunKey::new(job_name).to_bytes(), record_bytes)?;
        Ok(())
    }

    /// Get the latest run record of a job.
    pub fn get_job_run(&self, job_name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(CF_JOB_RUNS)?;
        Ok(self.db.get_cf(cf, JobRunKey::new(job_name).to_bytes())?)
    }

    /// All job run records, ordered by job name.
    pub fn list_job_runs(&self) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let cf = self.cf(CF_JOB_RUNS)?;
        let mut runs = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            runs.push((JobRunKey::from_bytes(&key)?.job_name, value.to_vec()));
        }
        Ok(runs)
    }

    // ==================== Maintenance ====================

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(cf)?;
            }
        }
        Ok(())
    }

    /// Get storage statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        Ok(StorageStats {
            document_count: self.count_cf_entries(self.cf(CF_DOCUMENTS)?)?,
            index_count: self.count_cf_entries(self.cf(CF_INDEX_SPECS)?)?,
            index_entry_count: self.count_cf_entries(self.cf(CF_INDEX_ENTRIES)?)?,
            job_run_count: self.count_cf_entries(self.cf(CF_JOB_RUNS)?)?,
        })
    }

    fn count_cf_entries(&self, cf: &ColumnFamily) -> Result<u64, StorageError> {
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

/// Index entry keys of one document across `indexes`.
fn index_entries(
    collection: &str,
    indexes: &[IndexMeta],
    id: &str,
    doc: &Value,
) -> Result<Vec<Vec<u8>>, StorageError> {
    indexes
        .iter()
        .map(|meta| {
            IndexEntryKey {
                collection: collection.to_string(),
                index_name: meta.spec.name(),
                values: meta.spec.encode_document(doc),
                id: id.to_string(),
            }
            .to_bytes()
        })
        .collect()
}

/// Statistics about the storage.
#[derive(Debug, Default)]
pub struct StorageStats {
    /// Documents across all collections
    pub document_count: u64,
    /// Registered indexes
    pub index_count: u64,
    /// Secondary index entries
    pub index_entry_count: u64,
    /// Stored job run records
    pub job_run_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    fn tag_index() -> IndexSpec {
        IndexSpec::new(&["tagname", "count"])
    }

    #[test]
    fn test_open_creates_column_families() {
        let (storage, _temp) = create_test_storage();
        for cf_name in ALL_CF_NAMES {
            assert!(storage.db.cf_handle(cf_name).is_some(), "missing {}", cf_name);
        }
    }

    #[test]
    fn test_put_and_get_document() {
        let (storage, _temp) = create_test_storage();
        let id = storage
            .put_document("user", &json!({"_id": "u1", "name": "ann"}))
            .unwrap();
        assert_eq!(id, "u1");

        let doc = storage.get_document("user", "u1").unwrap().unwrap();
        assert_eq!(doc["name"], "ann");
        assert!(storage.get_document("user", "u2").unwrap().is_none());
        assert!(storage.get_document("book", "u1").unwrap().is_none());
    }

    #[test]
    fn test_put_document_requires_id() {
        let (storage, _temp) = create_test_storage();
        let err = storage.put_document("user", &json!({"name": "x"})).unwrap_err();
        assert!(matches!(err, StorageError::InvalidDocument(_)));
    }

    #[test]
    fn test_scan_documents_pages() {
        let (storage, _temp) = create_test_storage();
        for i in 0..5 {
            storage
                .put_document("user", &json!({"_id": format!("u{}", i)}))
                .unwrap();
        }
        storage.put_document("users", &json!({"_id": "other"})).unwrap();

        let first = storage.scan_documents("user", None, 2).unwrap();
        let ids: Vec<_> = first.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["u0", "u1"]);

        let rest = storage.scan_documents("user", Some("u1"), 10).unwrap();
        let ids: Vec<_> = rest.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["u2", "u3", "u4"]);

        assert!(storage.scan_documents("user", Some("u4"), 10).unwrap().is_empty());
        assert_eq!(storage.count_documents("user").unwrap(), 5);
    }

    #[test]
    fn test_insert_rejects_duplicates_and_continues() {
        let (storage, _temp) = create_test_storage();
        storage.put_document("out", &json!({"_id": "a"})).unwrap();

        let mode = WriteMode {
            continue_on_error: true,
            acknowledged: false,
        };
        let outcome = storage
            .insert_documents(
                "out",
                &[json!({"_id": "a"}), json!({"_id": "b"}), json!({"_id": "b"}), json!({"_id": "c"})],
                mode,
            )
            .unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.failures[0].position, 0);
        assert_eq!(outcome.failures[1].id.as_deref(), Some("b"));
        assert_eq!(storage.count_documents("out").unwrap(), 3);
    }

    #[test]
    fn test_ordered_insert_stops_at_first_failure() {
        let (storage, _temp) = create_test_storage();
        storage.put_document("out", &json!({"_id": "b"})).unwrap();

        let outcome = storage
            .insert_documents(
                "out",
                &[json!({"_id": "a"}), json!({"_id": "b"}), json!({"_id": "c"})],
                WriteMode::default(),
            )
            .unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert!(storage.get_document("out", "c").unwrap().is_none());
    }

    #[test]
    fn test_delete_documents() {
        let (storage, _temp) = create_test_storage();
        for id in ["a", "b", "c"] {
            storage.put_document("out", &json!({"_id": id})).unwrap();
        }
        let removed = storage
            .delete_documents("out", &["a".to_string(), "c".to_string(), "zz".to_string()])
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(storage.count_documents("out").unwrap(), 1);
    }

    #[test]
    fn test_index_build_and_query() {
        let (storage, _temp) = create_test_storage();
        storage
            .put_document("out", &json!({"_id": "u1::0", "tagname": "scifi", "count": 5}))
            .unwrap();
        storage
            .put_document("out", &json!({"_id": "u2::0", "tagname": "scifi", "count": 12}))
            .unwrap();
        storage
            .put_document("out", &json!({"_id": "u3::1", "tagname": "drama", "count": 40}))
            .unwrap();

        assert!(storage.ensure_index("out", &tag_index()).unwrap());
        assert!(!storage.ensure_index("out", &tag_index()).unwrap());

        // Indexed by the write path after the build
        storage
            .insert_documents(
                "out",
                &[json!({"_id": "u4::0", "tagname": "scifi", "count": 7})],
                WriteMode::default(),
            )
            .unwrap();

        let top = storage
            .query_index("out", &tag_index(), &[json!("scifi")], 10, true)
            .unwrap();
        let counts: Vec<i64> = top.iter().map(|d| d["count"].as_i64().unwrap()).collect();
        assert_eq!(counts, vec![12, 7, 5]);

        let bottom = storage
            .query_index("out", &tag_index(), &[json!("scifi")], 1, false)
            .unwrap();
        assert_eq!(bottom[0]["_id"], "u1::0");
    }

    #[test]
    fn test_index_follows_delete_and_replace() {
        let (storage, _temp) = create_test_storage();
        storage.ensure_index("out", &tag_index()).unwrap();
        storage
            .put_document("out", &json!({"_id": "a", "tagname": "x", "count": 1}))
            .unwrap();
        storage
            .put_document("out", &json!({"_id": "a", "tagname": "x", "count": 9}))
            .unwrap();
        storage
            .put_document("out", &json!({"_id": "b", "tagname": "x", "count": 3}))
            .unwrap();
        storage.delete_documents("out", &["b".to_string()]).unwrap();

        let docs = storage
            .query_index("out", &tag_index(), &[json!("x")], 10, true)
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["count"], 9);
        assert_eq!(storage.get_stats().unwrap().index_entry_count, 1);
    }

    #[test]
    fn test_query_unknown_index() {
        let (storage, _temp) = create_test_storage();
        let err = storage
            .query_index("out", &tag_index(), &[json!("x")], 10, true)
            .unwrap_err();
        assert!(matches!(err, StorageError::IndexNotFound(_)));
    }

    #[test]
    fn test_job_runs() {
        let (storage, _temp) = create_test_storage();
        storage.put_job_run("users:book:all", b"{\"ok\":true}").unwrap();
        storage.put_job_run("subjects:book", b"{}").unwrap();

        assert_eq!(
            storage.get_job_run("users:book:all").unwrap().unwrap(),
            b"{\"ok\":true}".to_vec()
        );
        let names: Vec<String> = storage
            .list_job_runs()
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["subjects:book", "users:book:all"]);
    }

    #[test]
    fn test_collection_stats() {
        let (storage, _temp) = create_test_storage();
        storage.put_document("book", &json!({"_id": 1})).unwrap();
        storage.put_document("user", &json!({"_id": "a"})).unwrap();
        storage.put_document("user", &json!({"_id": "b"})).unwrap();

        let stats = storage.collection_stats().unwrap();
        assert_eq!(stats, vec![("book".to_string(), 1), ("user".to_string(), 2)]);
        assert_eq!(storage.get_stats().unwrap().document_count, 3);
    }
}

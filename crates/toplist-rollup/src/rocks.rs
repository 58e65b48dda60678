//! RocksDB implementations of the store seams.
//!
//! Storage calls are synchronous, so every read and write runs on the
//! blocking pool. Cursors read the source collection in id-ordered pages and
//! apply the filter and projection while paging.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use toplist_storage::{IndexSpec, Storage, WriteMode};
use toplist_types::{SourceDocument, TagRecord};

use crate::error::RollupError;
use crate::store::{
    DocumentCursor, DocumentStore, Filter, IndexOptions, InsertOptions, InsertReport,
    OutputCollection, Projection, RecordFailure, WriteConcern,
};

/// [`DocumentStore`] backed by [`Storage`].
#[derive(Clone)]
pub struct RocksDocumentStore {
    storage: Arc<Storage>,
    page_size: usize,
}

impl RocksDocumentStore {
    pub fn new(storage: Arc<Storage>, page_size: usize) -> Self {
        Self {
            storage,
            page_size: page_size.max(1),
        }
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }
}

#[async_trait]
impl DocumentStore for RocksDocumentStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> Result<Box<dyn DocumentCursor>, RollupError> {
        debug!(collection, page_size = self.page_size, "Opening cursor");
        Ok(Box::new(RocksCursor {
            storage: self.storage.clone(),
            collection: collection.to_string(),
            filter: filter.clone(),
            projection: projection.clone(),
            page_size: self.page_size,
            buffer: VecDeque::new(),
            last_id: None,
            exhausted: false,
            paused: false,
        }))
    }

    fn collection(&self, name: &str) -> Arc<dyn OutputCollection> {
        Arc::new(RocksCollection {
            storage: self.storage.clone(),
            name: name.to_string(),
        })
    }
}

/// Paged cursor over one collection.
pub struct RocksCursor {
    storage: Arc<Storage>,
    collection: String,
    filter: Filter,
    projection: Projection,
    page_size: usize,
    buffer: VecDeque<SourceDocument>,
    /// Id of the last scanned document, matching or not
    last_id: Option<String>,
    exhausted: bool,
    paused: bool,
}

impl RocksCursor {
    /// Read pages until one yields a matching document or the collection
    /// ends.
    async fn fill(&mut self) -> Result<(), RollupError> {
        while self.buffer.is_empty() && !self.exhausted {
            let storage = self.storage.clone();
            let collection = self.collection.clone();
            let after = self.last_id.clone();
            let limit = self.page_size;
            let page = tokio::task::spawn_blocking(move || {
                storage.scan_documents(&collection, after.as_deref(), limit)
            })
            .await??;

            if page.len() < self.page_size {
                self.exhausted = true;
            }
            if let Some((id, _)) = page.last() {
                self.last_id = Some(id.clone());
            }
            for (id, body) in page {
                if !self.filter.matches(&body) {
                    continue;
                }
                self.buffer
                    .push_back(SourceDocument::new(id, self.projection.apply(&body)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentCursor for RocksCursor {
    async fn next_document(&mut self) -> Option<Result<SourceDocument, RollupError>> {
        if self.paused {
            return Some(Err(RollupError::Store(format!(
                "cursor on {} read while paused",
                self.collection
            ))));
        }
        if let Err(e) = self.fill().await {
            self.exhausted = true;
            self.buffer.clear();
            return Some(Err(e));
        }
        self.buffer.pop_front().map(Ok)
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }
}

/// [`OutputCollection`] backed by one storage collection.
pub struct RocksCollection {
    storage: Arc<Storage>,
    name: String,
}

#[async_trait]
impl OutputCollection for RocksCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn remove_ids(&self, ids: &[String]) -> Result<usize, RollupError> {
        let storage = self.storage.clone();
        let name = self.name.clone();
        let ids = ids.to_vec();
        let removed =
            tokio::task::spawn_blocking(move || storage.delete_documents(&name, &ids)).await??;
        Ok(removed)
    }

    async fn insert_many(
        &self,
        records: &[TagRecord],
        options: InsertOptions,
    ) -> Result<InsertReport, RollupError> {
        let docs = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RollupError::Store(e.to_string()))?;
        let mode = WriteMode {
            continue_on_error: options.continue_on_error,
            acknowledged: options.write_concern == WriteConcern::Acknowledged,
        };

        let storage = self.storage.clone();
        let name = self.name.clone();
        let outcome =
            tokio::task::spawn_blocking(move || storage.insert_documents(&name, &docs, mode))
                .await??;

        Ok(InsertReport {
            inserted: outcome.inserted,
            failures: outcome
                .failures
                .into_iter()
                .map(|f| RecordFailure {
                    id: f.id,
                    reason: f.reason,
                })
                .collect(),
        })
    }

    /// Builds never block writers here, so `background` has no effect.
    async fn ensure_index(
        &self,
        spec: &IndexSpec,
        _options: IndexOptions,
    ) -> Result<(), RollupError> {
        let storage = self.storage.clone();
        let name = self.name.clone();
        let spec = spec.clone();
        tokio::task::spawn_blocking(move || storage.ensure_index(&name, &spec)).await??;
        Ok(())
    }
}

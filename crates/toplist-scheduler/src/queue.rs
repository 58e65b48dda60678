//! Concurrency-limited job queue.
//!
//! Every queued job runs on its own task while holding one permit of a
//! shared semaphore, so at most `concurrency` jobs are active at once. The
//! permit is released when the job's future finishes, whatever the outcome.
//!
//! Rollup jobs additionally claim their output collection: two rollups that
//! write the same collection never overlap, the later one waits its turn.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use toplist_rollup::{run_job, DocumentStore, JobReport, JobSpec};
use toplist_types::RollupSettings;

use crate::SchedulerError;

/// Output collections currently being written.
#[derive(Default)]
struct ActiveCollections {
    names: Mutex<HashSet<String>>,
    released: Notify,
}

impl ActiveCollections {
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn claim(self: &Arc<Self>, collection: &str) -> CollectionClaim {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            if self.lock().insert(collection.to_string()) {
                return CollectionClaim {
                    active: self.clone(),
                    collection: collection.to_string(),
                };
            }
            debug!(collection, "Waiting for running job on the same collection");
            released.await;
        }
    }
}

/// Releases the collection when dropped, even if the job panicked.
struct CollectionClaim {
    active: Arc<ActiveCollections>,
    collection: String,
}

impl Drop for CollectionClaim {
    fn drop(&mut self) {
        self.active.lock().remove(&self.collection);
        self.active.released.notify_waiters();
    }
}

/// Runs jobs against a shared store with bounded concurrency.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn DocumentStore>,
    permits: Arc<Semaphore>,
    active: Arc<ActiveCollections>,
    concurrency: usize,
}

impl JobQueue {
    pub fn new(store: Arc<dyn DocumentStore>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            store,
            permits: Arc::new(Semaphore::new(concurrency)),
            active: Arc::new(ActiveCollections::default()),
            concurrency,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Jobs running right now.
    pub fn running(&self) -> usize {
        self.concurrency - self.permits.available_permits()
    }

    /// Queue `job_fn`. It is called with the store once a permit is free.
    pub fn queue<F, Fut, T>(&self, job_fn: F) -> JoinHandle<Result<T, SchedulerError>>
    where
        F: FnOnce(Arc<dyn DocumentStore>) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| SchedulerError::QueueClosed)?;
            Ok(job_fn(store).await)
        })
    }

    /// Queue a rollup job. It waits for any running job on the same output
    /// collection before taking a permit.
    pub fn queue_rollup(
        &self,
        spec: JobSpec,
        settings: RollupSettings,
    ) -> JoinHandle<Result<JobReport, SchedulerError>> {
        let permits = self.permits.clone();
        let store = self.store.clone();
        let active = self.active.clone();
        tokio::spawn(async move {
            let _claim = active.claim(&spec.output_collection).await;
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| SchedulerError::QueueClosed)?;
            info!(job = %spec.name, "Dequeued rollup");
            Ok(run_job(store, spec, &settings).await?)
        })
    }

    /// Stop handing out permits. Jobs already waiting fail with
    /// [`SchedulerError::QueueClosed`].
    pub fn close(&self) {
        self.permits.close();
    }
}

/// Wait for a queued job and flatten task failures into the job's result.
pub async fn join<T>(handle: JoinHandle<Result<T, SchedulerError>>) -> Result<T, SchedulerError> {
    handle
        .await
        .map_err(|e| SchedulerError::Aborted(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use toplist_rollup::{
        DocumentCursor, Filter, OutputCollection, Projection, RocksDocumentStore, RollupError,
    };
    use toplist_storage::Storage;

    /// Store that must never be touched.
    struct UnusedStore;

    #[async_trait]
    impl DocumentStore for UnusedStore {
        async fn find(
            &self,
            _collection: &str,
            _filter: &Filter,
            _projection: &Projection,
        ) -> Result<Box<dyn DocumentCursor>, RollupError> {
            Err(RollupError::Store("unused".to_string()))
        }

        fn collection(&self, _name: &str) -> Arc<dyn OutputCollection> {
            unreachable!("no collection in queue tests")
        }
    }

    fn queue(concurrency: usize) -> JobQueue {
        JobQueue::new(Arc::new(UnusedStore), concurrency)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let queue = queue(2);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let current = current.clone();
                let peak = peak.clone();
                queue.queue(move |_store| async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    i
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(join(handle).await.unwrap());
        }
        assert_eq!(results, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(queue.running(), 0);
    }

    #[tokio::test]
    async fn test_permit_released_after_panic() {
        let queue = queue(1);
        let handle = queue.queue(|_store| async {
            panic!("job blew up");
        });
        let err = join::<()>(handle).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Aborted(_)));

        let value = join(queue.queue(|_store| async { 7 })).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_jobs() {
        let queue = queue(1);
        queue.close();
        let err = join(queue.queue(|_store| async {})).await.unwrap_err();
        assert!(matches!(err, SchedulerError::QueueClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_collection_claims_serialize() {
        let active = Arc::new(ActiveCollections::default());
        let first = active.claim("top_book_by_tag").await;

        let waiter = {
            let active = active.clone();
            tokio::spawn(async move {
                let _claim = active.claim("top_book_by_tag").await;
            })
        };
        // A different collection is not blocked
        let _other = active.claim("top_music_by_tag").await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
        assert_eq!(active.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_queue_rollup_parameter_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp_dir.path()).unwrap());
        let store: Arc<dyn DocumentStore> = Arc::new(RocksDocumentStore::new(storage, 100));
        let queue = JobQueue::new(store, 4);

        let settings = RollupSettings {
            batch_size: 0,
            ..Default::default()
        };
        let spec = JobSpec::subjects_by_tag("book", &RollupSettings::default()).unwrap();
        let err = join(queue.queue_rollup(spec, settings)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Rollup(RollupError::Config(_))));
    }
}

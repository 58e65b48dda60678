//! Record batcher.
//!
//! Decouples record production from durable writes. Records accumulate in
//! an open batch which is sealed when it reaches `batch_size` or when
//! `flush_timeout` passes without a flush. Sealed batches are applied in
//! order by a single flush worker task, so at most one write is in flight.
//!
//! Backpressure is explicit: [`RecordBatcher::write`] reports whether the
//! buffer is still under the high-water mark, and [`RecordBatcher::drained`]
//! resolves once a flush brought it back under.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use toplist_types::{RollupSettings, TagRecord};

use crate::error::RollupError;
use crate::sink::{BatchOutcome, BulkUpsertSink};

/// Batching limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatcherConfig {
    pub batch_size: usize,
    pub flush_timeout: Duration,
    pub high_water_mark: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self::from(&RollupSettings::default())
    }
}

impl From<&RollupSettings> for BatcherConfig {
    fn from(settings: &RollupSettings) -> Self {
        Self {
            batch_size: settings.batch_size.max(1),
            flush_timeout: Duration::from_millis(settings.flush_timeout_ms),
            high_water_mark: settings.high_water_mark.max(settings.batch_size),
        }
    }
}

/// Totals reported when the batcher ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatcherStats {
    pub batches_flushed: usize,
    /// Records handed to the sink
    pub records_flushed: usize,
    pub records_inserted: usize,
    pub insert_failures: usize,
    /// Batches whose delete phase failed
    pub delete_failures: usize,
}

impl BatcherStats {
    fn record(&mut self, outcome: &BatchOutcome) {
        self.batches_flushed += 1;
        self.records_flushed += outcome.records;
        self.records_inserted += outcome.inserted;
        self.insert_failures += outcome.insert_failures;
        if outcome.delete_failed {
            self.delete_failures += 1;
        }
    }
}

struct BatchState {
    current: Vec<TagRecord>,
    sealed: VecDeque<Vec<TagRecord>>,
    /// Records in `current`, `sealed` and the in-flight batch
    buffered: usize,
    last_flush: Instant,
    ended: bool,
    failed: bool,
}

impl BatchState {
    fn seal(&mut self) {
        if !self.current.is_empty() {
            let batch = std::mem::take(&mut self.current);
            self.sealed.push_back(batch);
        }
    }
}

struct Shared {
    state: Mutex<BatchState>,
    /// Wakes the flush worker
    work: Notify,
    /// Fired after every completed flush
    drained: Notify,
    config: BatcherConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Buffers records and writes them through a [`BulkUpsertSink`].
pub struct RecordBatcher {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<Result<BatcherStats, RollupError>>>,
}

impl RecordBatcher {
    /// Start a batcher and its flush worker. Must be called inside a tokio
    /// runtime.
    pub fn new(sink: BulkUpsertSink, config: BatcherConfig) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(BatchState {
                current: Vec::with_capacity(config.batch_size),
                sealed: VecDeque::new(),
                buffered: 0,
                last_flush: Instant::now(),
                ended: false,
                failed: false,
            }),
            work: Notify::new(),
            drained: Notify::new(),
            config,
        });
        let worker = tokio::spawn(flush_worker(shared.clone(), sink));
        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Append a record.
    ///
    /// Returns `false` once the buffer has reached the high-water mark (or
    /// the flush worker has failed); the caller should stop producing until
    /// [`RecordBatcher::drained`] resolves.
    pub fn write(&self, record: TagRecord) -> bool {
        let config = self.shared.config;
        let (accepted, sealed) = {
            let mut state = self.shared.lock();
            state.current.push(record);
            state.buffered += 1;
            let sealed = state.current.len() >= config.batch_size;
            if sealed {
                state.seal();
            }
            (!state.failed && state.buffered < config.high_water_mark, sealed)
        };
        if sealed {
            self.shared.work.notify_one();
        }
        accepted
    }

    /// Records not yet written: open batch, sealed batches and the batch in
    /// flight.
    pub fn buffered(&self) -> usize {
        self.shared.lock().buffered
    }

    pub fn high_water_mark(&self) -> usize {
        self.shared.config.high_water_mark
    }

    /// Whether a flush failed fatally. No further batches are applied.
    pub fn has_failed(&self) -> bool {
        self.shared.lock().failed
    }

    /// Wait until the buffer is back under the high-water mark.
    ///
    /// Also returns when the flush worker has failed, so a paused producer
    /// is never stranded.
    pub async fn drained(&self) {
        loop {
            let notified = self.shared.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.shared.lock();
                if state.failed || state.buffered < self.shared.config.high_water_mark {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Flush the trailing batch and wait for every queued write.
    ///
    /// Resolves exactly once with the totals, or with the first fatal sink
    /// error.
    pub async fn end(mut self) -> Result<BatcherStats, RollupError> {
        self.shared.lock().ended = true;
        self.shared.work.notify_one();
        match self.worker.take() {
            Some(worker) => worker.await?,
            None => Err(RollupError::Worker("batcher already ended".to_string())),
        }
    }
}

impl Drop for RecordBatcher {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

enum Step {
    Flush(Vec<TagRecord>),
    Wait(Instant),
    Finish,
}

async fn flush_worker(
    shared: Arc<Shared>,
    sink: BulkUpsertSink,
) -> Result<BatcherStats, RollupError> {
    let flush_timeout = shared.config.flush_timeout;
    let mut stats = BatcherStats::default();

    loop {
        let step = {
            let mut state = shared.lock();
            if let Some(batch) = state.sealed.pop_front() {
                Step::Flush(batch)
            } else if state.ended {
                state.seal();
                match state.sealed.pop_front() {
                    Some(batch) => Step::Flush(batch),
                    None => Step::Finish,
                }
            } else {
                Step::Wait(state.last_flush + flush_timeout)
            }
        };

        match step {
            Step::Flush(batch) => {
                let result = sink.apply(&batch).await;
                {
                    let mut state = shared.lock();
                    state.buffered = state.buffered.saturating_sub(batch.len());
                    state.last_flush = Instant::now();
                    if result.is_err() {
                        state.failed = true;
                    }
                }
                shared.drained.notify_waiters();

                match result {
                    Ok(outcome) => stats.record(&outcome),
                    Err(e) => {
                        warn!(
                            collection = %sink.collection_name(),
                            error = %e,
                            "Flush failed, dropping remaining batches"
                        );
                        return Err(e);
                    }
                }
            }
            Step::Wait(deadline) => {
                tokio::select! {
                    _ = shared.work.notified() => {}
                    _ = tokio::time::sleep_until(deadline) => {
                        let mut state = shared.lock();
                        if state.current.is_empty() {
                            // Nothing to flush; the timer restarts from now
                            state.last_flush = Instant::now();
                        } else if state.sealed.is_empty() {
                            debug!(
                                collection = %sink.collection_name(),
                                records = state.current.len(),
                                "Flush timeout reached"
                            );
                            state.seal();
                        }
                    }
                }
            }
            Step::Finish => {
                debug!(
                    collection = %sink.collection_name(),
                    batches = stats.batches_flushed,
                    records = stats.records_flushed,
                    "Batcher drained"
                );
                return Ok(stats);
            }
        }
    }
}

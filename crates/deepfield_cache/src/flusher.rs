//! # Write-Behind Flusher
//!
//! **Load-adaptive background persistence**
//!
//! The cache never waits on disk. Each mutation enqueues one
//! [`StoreTransaction`]; a dedicated thread drains the queue on an interval
//! and hands the whole batch to the store.
//!
//! ## Architecture
//!
//! ```text
//!   SpatialChunkCache ──> [Write Queue] ──> [Flusher Thread] ──> ChunkStore
//!     (single writer)      (FIFO, Mutex)     (single drainer)
//! ```
//!
//! ## Throttle
//!
//! While more than `busy_threshold` transactions arrived inside the trailing
//! `rate_window_ms`, the flusher switches to `slow_interval_ms` so bursts are
//! written as a few large batches. Once the rate drops it returns to
//! `fast_interval_ms`.
//!
//! ## Failure
//!
//! A failed batch is put back at the head of the queue and retried on the
//! next cycle. The in-memory cache stays authoritative in the meantime.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::StoreResult;
use crate::store::{SharedStore, StoreTransaction};

/// Configuration for the write-behind flusher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    /// Flush interval under normal load (ms).
    pub fast_interval_ms: u64,
    /// Flush interval while busy (ms).
    pub slow_interval_ms: u64,
    /// Arrivals inside the window above which the flusher is busy.
    pub busy_threshold: usize,
    /// Trailing window over which arrivals are counted (ms).
    pub rate_window_ms: u64,
    /// Buckets fetched per page during cold start.
    pub load_page_buckets: usize,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            fast_interval_ms: 500,
            slow_interval_ms: 5_000,
            busy_threshold: 32,
            rate_window_ms: 10_000,
            load_page_buckets: 6,
        }
    }
}

/// Statistics for the flusher.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Batches successfully written.
    pub flushes: u64,
    /// Batches that failed and were re-queued.
    pub failures: u64,
    /// Transactions successfully written.
    pub transactions_written: u64,
    /// Most recent failure, cleared by the next success.
    pub last_error: Option<String>,
    /// True while the throttle is on the slow interval.
    pub throttled: bool,
}

/// Chooses the flush interval from the recent arrival rate.
#[derive(Debug)]
pub struct FlushThrottle {
    fast: Duration,
    slow: Duration,
    window: Duration,
    threshold: usize,
    arrivals: VecDeque<Instant>,
    slow_mode: bool,
}

impl FlushThrottle {
    /// Creates a throttle from `config`.
    #[must_use]
    pub fn new(config: &FlushConfig) -> Self {
        Self {
            fast: Duration::from_millis(config.fast_interval_ms),
            slow: Duration::from_millis(config.slow_interval_ms),
            window: Duration::from_millis(config.rate_window_ms),
            threshold: config.busy_threshold,
            arrivals: VecDeque::new(),
            slow_mode: false,
        }
    }

    /// Records one arrival at `now`.
    pub fn record(&mut self, now: Instant) {
        self.arrivals.push_back(now);
        self.prune(now);
    }

    /// Interval to wait before the next flush, as of `now`.
    pub fn interval(&mut self, now: Instant) -> Duration {
        self.prune(now);
        let busy = self.arrivals.len() > self.threshold;
        if busy != self.slow_mode {
            self.slow_mode = busy;
            if busy {
                info!(
                    arrivals = self.arrivals.len(),
                    interval_ms = self.slow.as_millis(),
                    "write rate high, slowing flushes"
                );
            } else {
                info!(interval_ms = self.fast.as_millis(), "write rate normal, fast flushes");
            }
        }
        if busy {
            self.slow
        } else {
            self.fast
        }
    }

    /// True while the slow interval is in effect.
    #[must_use]
    pub const fn is_slow(&self) -> bool {
        self.slow_mode
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.arrivals.front() {
            if now.saturating_duration_since(oldest) > self.window {
                self.arrivals.pop_front();
            } else {
                break;
            }
        }
    }
}

struct QueueState {
    transactions: VecDeque<StoreTransaction>,
    throttle: FlushThrottle,
}

struct WriteQueue {
    state: Mutex<QueueState>,
    /// Wakes the flusher for shutdown.
    wake: Condvar,
    /// Held for the duration of a drain + apply so batches reach the store
    /// in queue order even when `flush_now` races the flusher thread.
    flushing: Mutex<()>,
}

/// Background writer feeding a [`crate::ChunkStore`].
pub struct WriteBehind {
    queue: Arc<WriteQueue>,
    store: SharedStore,
    stats: Arc<Mutex<FlushStats>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WriteBehind {
    /// Starts the flusher thread.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Io`] if the thread cannot be spawned.
    pub fn spawn(store: SharedStore, config: FlushConfig) -> StoreResult<Self> {
        let queue = Arc::new(WriteQueue {
            state: Mutex::new(QueueState {
                transactions: VecDeque::new(),
                throttle: FlushThrottle::new(&config),
            }),
            wake: Condvar::new(),
            flushing: Mutex::new(()),
        });
        let stats = Arc::new(Mutex::new(FlushStats::default()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker_queue = Arc::clone(&queue);
        let worker_store = Arc::clone(&store);
        let worker_stats = Arc::clone(&stats);
        let worker_shutdown = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("deepfield-flusher".to_string())
            .spawn(move || {
                Self::flusher_loop(&worker_queue, &worker_store, &worker_stats, &worker_shutdown);
            })?;

        debug!(?config, "write-behind flusher started");
        Ok(Self {
            queue,
            store,
            stats,
            shutdown,
            handle: Some(handle),
        })
    }

    fn flusher_loop(
        queue: &WriteQueue,
        store: &SharedStore,
        stats: &Mutex<FlushStats>,
        shutdown: &AtomicBool,
    ) {
        loop {
            {
                let mut state = queue.state.lock();
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                let interval = state.throttle.interval(Instant::now());
                stats.lock().throttled = state.throttle.is_slow();
                queue.wake.wait_for(&mut state, interval);
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
            }

            if let Err(err) = Self::flush_once(queue, store, stats) {
                warn!(%err, "flush failed, batch re-queued");
            }
        }

        // Final flush on shutdown
        if let Err(err) = Self::flush_once(queue, store, stats) {
            let lost = queue.state.lock().transactions.len();
            error!(%err, transactions = lost, "final flush failed, writes lost");
        }
    }

    /// Drains the queue into the store. Returns the number of transactions
    /// written.
    fn flush_once(
        queue: &WriteQueue,
        store: &SharedStore,
        stats: &Mutex<FlushStats>,
    ) -> StoreResult<usize> {
        let _order = queue.flushing.lock();

        let batch: Vec<StoreTransaction> = queue.state.lock().transactions.drain(..).collect();
        if batch.is_empty() {
            return Ok(0);
        }

        let result = store.lock().apply(&batch);
        match result {
            Ok(()) => {
                let mut s = stats.lock();
                s.flushes += 1;
                s.transactions_written += batch.len() as u64;
                s.last_error = None;
                debug!(transactions = batch.len(), "flushed");
                Ok(batch.len())
            }
            Err(err) => {
                {
                    let mut state = queue.state.lock();
                    for transaction in batch.into_iter().rev() {
                        state.transactions.push_front(transaction);
                    }
                }
                let mut s = stats.lock();
                s.failures += 1;
                s.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Queues one transaction. Empty transactions are ignored.
    pub fn enqueue(&self, transaction: StoreTransaction) {
        if transaction.is_empty() {
            return;
        }
        let mut state = self.queue.state.lock();
        state.throttle.record(Instant::now());
        state.transactions.push_back(transaction);
    }

    /// Flushes everything queued so far on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the store's error; the batch stays queued.
    pub fn flush_now(&self) -> StoreResult<usize> {
        Self::flush_once(&self.queue, &self.store, &self.stats)
    }

    /// Transactions waiting to be written.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.state.lock().transactions.len()
    }

    /// Returns current statistics.
    #[must_use]
    pub fn stats(&self) -> FlushStats {
        self.stats.lock().clone()
    }

    /// The store being written to.
    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }
}

impl Drop for WriteBehind {
    fn drop(&mut self) {
        {
            let _state = self.queue.state.lock();
            self.shutdown.store(true, Ordering::Release);
            self.queue.wake.notify_all();
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("flusher thread panicked");
            }
        }
    }
}

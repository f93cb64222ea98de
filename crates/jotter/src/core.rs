// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! State shared between client handles and the four queue workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tempo::Clock;

use crate::adapter::CacheAdapter;
use crate::config::CacheOptions;
use crate::control::Controller;
use crate::entry::{Entry, EntryCore, EntryState};
use crate::events::{CacheEvent, CacheEventListener};
use crate::inflight::InflightMap;
use crate::message::CacheMessage;
use crate::monitor::{Monitor, bump};
use crate::pool::IoPool;
use crate::throttle::ThrottledLog;

/// What a queued read request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadKind {
    /// First read after allocation.
    Initial,
    /// Reconciliation read; `epoch` is the entry's cycle number at the time
    /// the resync was scheduled.
    Resync {
        epoch: u64,
    },
}

/// An item on the read queue.
pub(crate) struct ReadRequest<A: CacheAdapter> {
    pub entry: Arc<Entry<A>>,
    pub kind: ReadKind,
}

/// An item on the write queue.
pub(crate) struct WriteRequest<A: CacheAdapter> {
    pub entry: Arc<Entry<A>>,
    pub payload: A::Payload,
}

/// Liveness flags, one per worker thread.
#[derive(Debug, Default)]
pub(crate) struct WorkerAlive {
    pub read_queue: AtomicBool,
    pub write_queue: AtomicBool,
    pub main_queue: AtomicBool,
    pub return_queue: AtomicBool,
}

impl WorkerAlive {
    pub fn all_alive(&self) -> bool {
        self.read_queue.load(Ordering::Relaxed)
            && self.write_queue.load(Ordering::Relaxed)
            && self.main_queue.load(Ordering::Relaxed)
            && self.return_queue.load(Ordering::Relaxed)
    }
}

/// Everything one cache instance shares across threads.
pub(crate) struct Shared<A: CacheAdapter> {
    pub adapter: A,
    pub options: Arc<CacheOptions>,
    pub clock: Clock,
    pub controller: Controller,
    pub monitor: Arc<Monitor>,
    pub log: ThrottledLog,
    pub listener: RwLock<Option<Arc<dyn CacheEventListener>>>,
    pub inflight: InflightMap<A>,

    pub read_tx: flume::Sender<ReadRequest<A>>,
    pub read_rx: flume::Receiver<ReadRequest<A>>,
    pub write_tx: flume::Sender<WriteRequest<A>>,
    pub write_rx: flume::Receiver<WriteRequest<A>>,
    pub main_tx: flume::Sender<Arc<Entry<A>>>,
    pub main_rx: flume::Receiver<Arc<Entry<A>>>,
    pub return_tx: flume::Sender<Arc<Entry<A>>>,
    pub return_rx: flume::Receiver<Arc<Entry<A>>>,

    pub read_pool: IoPool,
    pub write_pool: IoPool,
    pub alive: WorkerAlive,
}

impl<A: CacheAdapter> std::fmt::Debug for Shared<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("cache", &self.options.name())
            .field("control_state", &self.controller.state())
            .field("resident", &self.inflight.len())
            .finish_non_exhaustive()
    }
}

impl<A: CacheAdapter> Shared<A> {
    pub fn new(adapter: A, options: CacheOptions, clock: Clock) -> Self {
        let options = Arc::new(options);
        let monitor = Arc::new(Monitor::default());
        let log = ThrottledLog::new(Arc::clone(&options), clock.clone(), Arc::clone(&monitor));

        let (read_tx, read_rx) = flume::unbounded();
        let (write_tx, write_rx) = flume::unbounded();
        let (main_tx, main_rx) = flume::unbounded();
        let (return_tx, return_rx) = flume::unbounded();

        let read_pool = IoPool::from_size(options.read_thread_pool_size(), &format!("{}-read-pool", options.name()));
        let write_pool = IoPool::from_size(
            options.write_thread_pool_size(),
            &format!("{}-write-pool", options.name()),
        );

        Self {
            adapter,
            options,
            clock,
            controller: Controller::default(),
            monitor,
            log,
            listener: RwLock::new(None),
            inflight: InflightMap::new(),
            read_tx,
            read_rx,
            write_tx,
            write_rx,
            main_tx,
            main_rx,
            return_tx,
            return_rx,
            read_pool,
            write_pool,
            alive: WorkerAlive::default(),
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    pub fn max_sleep(&self) -> Duration {
        self.options.max_sleep_time()
    }

    pub fn render_key(&self, key: &A::Key) -> String {
        format!("{key:?}")
    }

    pub fn fire_event(&self, make: impl FnOnce() -> CacheEvent) {
        if !self.options.event_notification_enabled() {
            return;
        }
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener.on_event(&make());
        }
    }

    /// Removes an entry while its core lock is held: transitions it to
    /// removed-from-cache, drops it from the inflight map, and fails any
    /// waiter.
    pub fn remove_entry_locked(&self, entry: &Arc<Entry<A>>, core: &mut EntryCore<A>) {
        core.state = EntryState::RemovedFromCache;
        self.inflight.remove(entry);
        entry.notify_waiters();
    }

    /// Enqueues the initial read for a freshly-allocated entry.
    pub fn enqueue_initial_read(&self, entry: Arc<Entry<A>>) {
        self.fire_event(|| CacheEvent::EntryCreated {
            key: self.render_key(entry.key()),
        });
        // The channel only disconnects at teardown; a failed send means the
        // entry will simply never load, which shutdown cleans up.
        let _ = self.read_tx.send(ReadRequest {
            entry,
            kind: ReadKind::Initial,
        });
    }

    pub fn send_log(&self, message: CacheMessage) {
        self.log.log(&message);
    }

    /// Whether the pipeline holds no work at all.
    pub fn drained(&self) -> bool {
        self.inflight.is_empty()
            && self.read_rx.is_empty()
            && self.write_rx.is_empty()
            && self.main_rx.is_empty()
            && self.return_rx.is_empty()
    }

    /// Folds the finished cycle's failure flag into the cycle-level budget.
    ///
    /// Returns `true` when the entry has exhausted its cycle retries and must
    /// be removed.
    pub fn account_cycle_failure(&self, core: &mut EntryCore<A>) -> bool {
        if !core.cycle_had_failure {
            return false;
        }
        core.cycle_had_failure = false;
        core.full_cycle_failure_count += 1;
        bump(&self.monitor.counters.full_cycle_failures);
        core.full_cycle_failure_count >= self.options.full_cache_cycle_failure_max_retry_count()
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The client-facing cache type.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tempo::Clock;

use crate::adapter::CacheAdapter;
use crate::config::{CacheOptions, to_millis};
use crate::control::ControlState;
use crate::core::Shared;
use crate::entry::{Entry, EntryState};
use crate::error::{CacheError, Result};
use crate::events::CacheEventListener;
use crate::inflight::Lookup;
use crate::message::{CacheMessage, Severity};
use crate::monitor::bump;
use crate::status::CacheStatus;

/// A write-behind, resync-in-background cache.
///
/// Sits between application code and a slow, fallible backing store: reads
/// and many small updates are absorbed in memory, written out
/// asynchronously, and periodically reconciled against storage through
/// resync reads. The backing store and the payload's merge semantics are
/// supplied through a [`CacheAdapter`].
///
/// # Lifecycle
///
/// A cache must be [`start`](Self::start)ed before use; client operations
/// against a cache that is not running fail with a control-state error.
/// [`flush_for`](Self::flush_for) drains all pending work and returns the
/// cache to service empty; [`shutdown_for`](Self::shutdown_for) drains and
/// terminates the worker threads.
///
/// # Threads
///
/// Four worker threads (read, write, main, return queue) are spawned at
/// start, named after the cache. No worker blocks longer than
/// `max_sleep_time` in one go, so control-state changes are observed with
/// bounded latency.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use jotter::{CacheOptions, WriteBehindCache};
/// use jotter::testing::CharSeqBacking;
///
/// let options = CacheOptions::builder("example")
///     .main_queue_cache_time(Duration::from_millis(100))
///     .main_queue_cache_time_min(Duration::from_millis(10))
///     .return_queue_cache_time_min(Duration::from_millis(50))
///     .max_sleep_time(Duration::from_millis(10))
///     .build()?;
/// let cache = WriteBehindCache::new(CharSeqBacking::new(), options);
///
/// cache.start()?;
/// let value = cache.read_for(&"user:1".to_owned(), Duration::from_millis(500))?;
/// assert_eq!(value.as_deref(), Some(""));
///
/// cache.write_if_cached(&"user:1".to_owned(), 'a')?;
/// cache.shutdown_for(Duration::from_secs(3))?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct WriteBehindCache<A: CacheAdapter> {
    shared: Arc<Shared<A>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    status_cache: Mutex<Option<(u64, Arc<CacheStatus>)>>,
}

impl<A: CacheAdapter> std::fmt::Debug for WriteBehindCache<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBehindCache")
            .field("name", &self.shared.options.name())
            .field("control_state", &self.shared.controller.state())
            .field("size", &self.shared.inflight.len())
            .finish_non_exhaustive()
    }
}

impl<A: CacheAdapter> Drop for WriteBehindCache<A> {
    fn drop(&mut self) {
        // A dropped cache cannot be drained, but its worker threads must not
        // outlive it; they observe the terminal state within one sleep bound.
        if !self.shared.controller.state().is_shutdown() {
            self.shared.controller.complete_shutdown();
        }
    }
}

impl<A: CacheAdapter> WriteBehindCache<A> {
    /// Creates a cache over the given adapter and options, using the system
    /// clock.
    #[must_use]
    pub fn new(adapter: A, options: CacheOptions) -> Self {
        Self::with_clock(adapter, options, Clock::new())
    }

    /// Creates a cache with an explicit clock.
    ///
    /// Tests substitute a controlled clock here to drive scheduling
    /// decisions deterministically.
    #[must_use]
    pub fn with_clock(adapter: A, options: CacheOptions, clock: Clock) -> Self {
        Self {
            shared: Arc::new(Shared::new(adapter, options, clock)),
            threads: Mutex::new(Vec::new()),
            status_cache: Mutex::new(None),
        }
    }

    /// The cache's configuration; runtime-mutable tunables can be adjusted
    /// through it while the cache runs.
    #[must_use]
    pub fn options(&self) -> &CacheOptions {
        &self.shared.options
    }

    /// The cache's clock.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.shared.clock
    }

    /// Current control state.
    #[must_use]
    pub fn control_state(&self) -> ControlState {
        self.shared.controller.state()
    }

    /// Number of resident entries.
    #[must_use]
    pub fn current_size(&self) -> usize {
        self.shared.inflight.len()
    }

    /// Installs the event listener that receives internal cache events when
    /// `event_notification_enabled` is set.
    pub fn set_event_listener(&self, listener: Arc<dyn CacheEventListener>) {
        *self.shared.listener.write() = Some(listener);
    }

    /// Starts the cache: spawns the four queue worker threads.
    ///
    /// # Errors
    ///
    /// Fails unless the cache is in the not-started state; a shut-down cache
    /// cannot be restarted.
    pub fn start(&self) -> Result<()> {
        self.shared.controller.try_start()?;

        let name = self.shared.options.name().to_owned();
        let mut threads = self.threads.lock();
        for (suffix, body) in [
            ("read-queue", Self::spawn_read as fn(Arc<Shared<A>>)),
            ("write-queue", Self::spawn_write),
            ("main-queue", Self::spawn_main),
            ("return-queue", Self::spawn_return),
        ] {
            let shared = Arc::clone(&self.shared);
            let handle = std::thread::Builder::new()
                .name(format!("{name}-{suffix}"))
                .spawn(move || body(shared))
                .expect("failed to spawn cache worker thread");
            threads.push(handle);
        }

        self.shared.send_log(CacheMessage::Started);
        Ok(())
    }

    fn spawn_read(shared: Arc<Shared<A>>) {
        shared.read_queue_loop();
    }

    fn spawn_write(shared: Arc<Shared<A>>) {
        shared.write_queue_loop();
    }

    fn spawn_main(shared: Arc<Shared<A>>) {
        shared.main_queue_loop();
    }

    fn spawn_return(shared: Arc<Shared<A>>) {
        shared.return_queue_loop();
    }

    // ----- client reads -------------------------------------------------

    /// Ensures an entry is allocated and a read is in progress, without
    /// waiting for the result.
    ///
    /// # Errors
    ///
    /// Fails on control-state violations or when the cache is at its hard
    /// element limit.
    pub fn preload(&self, key: &A::Key) -> Result<()> {
        self.shared.controller.gate_client_op()?;
        bump(&self.shared.monitor.counters.cache_preload_attempts);
        let _ = self.resident_entry(key)?;
        Ok(())
    }

    /// Returns the cached value without blocking.
    ///
    /// `Ok(Some)` iff the entry is loaded; `Ok(None)` when the key is absent
    /// or still loading.
    ///
    /// # Errors
    ///
    /// Control-state violations; a failed-to-load error when the entry is in
    /// a terminal read failure, or when serving stale data after a permanent
    /// resync failure is disallowed.
    pub fn read_if_cached(&self, key: &A::Key) -> Result<Option<A::Value>> {
        self.shared.controller.gate_client_op()?;
        let counters = &self.shared.monitor.counters;
        bump(&counters.cache_read_attempts);

        let Some(entry) = self.shared.inflight.get(key) else {
            return Ok(None);
        };
        let mut core = entry.lock();
        match core.state {
            EntryState::Loaded | EntryState::ResyncPending => {
                self.check_stale_read_allowed(&core)?;
                core.last_access_millis = self.shared.now();
                let value = core.value.clone();
                bump(&counters.cache_read_successes);
                Ok(value)
            }
            EntryState::ReadFailedFinal => Err(self.failed_to_load(&core)),
            EntryState::NotYetRead | EntryState::RemovedFromCache => Ok(None),
        }
    }

    /// Like [`read_if_cached`](Self::read_if_cached) but raises instead of
    /// returning empty.
    ///
    /// # Errors
    ///
    /// As [`read_if_cached`](Self::read_if_cached), plus a not-yet-loaded
    /// error when no loaded value is available.
    pub fn try_read_if_cached(&self, key: &A::Key) -> Result<A::Value> {
        self.read_if_cached(key)?.ok_or(CacheError::NotYetLoaded)
    }

    /// Waits up to `timeout` for the entry to load and returns its value.
    ///
    /// `Ok(None)` means the wait timed out.
    ///
    /// # Errors
    ///
    /// Control-state violations, terminal load failures, admission refusal,
    /// or exhaustion of the removed-from-cache retry budget.
    pub fn read_for(&self, key: &A::Key, timeout: Duration) -> Result<Option<A::Value>> {
        self.read_until(key, self.shared.now().saturating_add(to_millis(timeout)))
    }

    /// As [`read_for`](Self::read_for) with an absolute virtual-ms deadline.
    ///
    /// # Errors
    ///
    /// See [`read_for`](Self::read_for).
    pub fn read_until(&self, key: &A::Key, deadline_millis: u64) -> Result<Option<A::Value>> {
        self.shared.controller.gate_client_op()?;
        let counters = &self.shared.monitor.counters;
        bump(&counters.cache_read_attempts);

        let attempts = self.shared.options.max_cache_removed_retries().saturating_add(1);
        for _ in 0..attempts {
            let entry = self.resident_entry(key)?;
            let mut core = entry.lock();
            loop {
                match core.state {
                    EntryState::Loaded | EntryState::ResyncPending => {
                        self.check_stale_read_allowed(&core)?;
                        core.last_access_millis = self.shared.now();
                        let value = core.value.clone();
                        bump(&counters.cache_read_successes);
                        return Ok(value);
                    }
                    EntryState::ReadFailedFinal => return Err(self.failed_to_load(&core)),
                    EntryState::RemovedFromCache => break,
                    EntryState::NotYetRead => {
                        let now = self.shared.now();
                        if now >= deadline_millis {
                            bump(&counters.cache_read_timeouts);
                            return Ok(None);
                        }
                        // Bounded slices keep the deadline responsive even
                        // under a controlled clock.
                        let slice = (deadline_millis - now).min(to_millis(self.shared.max_sleep()).max(1));
                        entry.wait(&mut core, Duration::from_millis(slice));
                    }
                }
            }
        }
        Err(CacheError::RemovedFromCacheRetryExhausted { attempts })
    }

    /// Like [`read_for`](Self::read_for) but a timeout raises.
    ///
    /// # Errors
    ///
    /// As [`read_for`](Self::read_for), plus a timeout error.
    pub fn try_read_for(&self, key: &A::Key, timeout: Duration) -> Result<A::Value> {
        self.read_for(key, timeout)?.ok_or(CacheError::Timeout)
    }

    /// Like [`read_until`](Self::read_until) but a timeout raises.
    ///
    /// # Errors
    ///
    /// As [`read_until`](Self::read_until), plus a timeout error.
    pub fn try_read_until(&self, key: &A::Key, deadline_millis: u64) -> Result<A::Value> {
        self.read_until(key, deadline_millis)?.ok_or(CacheError::Timeout)
    }

    // ----- client writes ------------------------------------------------

    /// Applies an update iff the entry is loaded.
    ///
    /// `Ok(Some(true))` when the update was accepted; `Ok(None)` when the key
    /// is not resident.
    ///
    /// # Errors
    ///
    /// Control-state violations; not-yet-loaded before the initial read
    /// completes; failed-to-load in terminal states or when update
    /// collection is suspended; too-many-updates at the pending cap.
    pub fn write_if_cached(&self, key: &A::Key, update: A::Update) -> Result<Option<bool>> {
        Ok(self.write_and_read(key, update)?.map(|_| true))
    }

    /// As [`write_if_cached`](Self::write_if_cached), returning the
    /// post-update cached view.
    ///
    /// # Errors
    ///
    /// See [`write_if_cached`](Self::write_if_cached).
    pub fn write_if_cached_and_read(&self, key: &A::Key, update: A::Update) -> Result<Option<A::Value>> {
        self.write_and_read(key, update)
    }

    /// Like [`write_if_cached`](Self::write_if_cached) but raises instead of
    /// returning empty.
    ///
    /// # Errors
    ///
    /// As [`write_if_cached`](Self::write_if_cached); an absent key raises
    /// not-yet-loaded.
    pub fn try_write_if_cached(&self, key: &A::Key, update: A::Update) -> Result<bool> {
        self.write_if_cached(key, update)?.ok_or(CacheError::NotYetLoaded)
    }

    /// Like [`write_if_cached_and_read`](Self::write_if_cached_and_read) but
    /// raises instead of returning empty.
    ///
    /// # Errors
    ///
    /// As [`write_if_cached_and_read`](Self::write_if_cached_and_read); an
    /// absent key raises not-yet-loaded.
    pub fn try_write_if_cached_and_read(&self, key: &A::Key, update: A::Update) -> Result<A::Value> {
        self.write_if_cached_and_read(key, update)?
            .ok_or(CacheError::NotYetLoaded)
    }

    fn write_and_read(&self, key: &A::Key, update: A::Update) -> Result<Option<A::Value>> {
        self.shared.controller.gate_client_op()?;
        let counters = &self.shared.monitor.counters;
        bump(&counters.cache_write_attempts);

        let Some(entry) = self.shared.inflight.get(key) else {
            return Ok(None);
        };
        let mut core = entry.lock();
        match core.state {
            EntryState::RemovedFromCache => Ok(None),
            EntryState::NotYetRead => Err(CacheError::NotYetLoaded),
            EntryState::ReadFailedFinal => Err(self.failed_to_load(&core)),
            EntryState::Loaded | EntryState::ResyncPending => {
                if core.stop_collecting_updates {
                    bump(&counters.cache_write_rejected);
                    return Err(self.failed_to_load(&core));
                }
                if !self.shared.options.allow_updates_collection_for_multiple_full_cycles()
                    && core.full_cycle_failure_count > 0
                {
                    bump(&counters.cache_write_rejected);
                    return Err(CacheError::FailedToLoad {
                        cause: "update collection suspended after a failed cache cycle".to_owned(),
                    });
                }
                let limit = self.shared.options.max_updates_to_collect();
                if core.pending_updates.len() >= limit {
                    bump(&counters.cache_write_too_many_updates);
                    return Err(CacheError::TooManyUpdates { limit });
                }

                core.pending_updates.push_back(update.clone());
                if let Some(value) = core.value.as_mut() {
                    self.shared.adapter.apply_update(value, &update);
                }
                core.last_access_millis = self.shared.now();
                bump(&counters.cache_write_successes);
                Ok(core.value.clone())
            }
        }
    }

    // ----- admin --------------------------------------------------------

    /// Drains the cache within `timeout` and returns it to service empty.
    ///
    /// Returns `true` when everything was written out and the cache is
    /// empty; `false` when the deadline passed first (the cache still
    /// returns to running with whatever remains).
    ///
    /// # Errors
    ///
    /// Control-state violations; only one flush may run at a time.
    pub fn flush_for(&self, timeout: Duration) -> Result<bool> {
        self.flush_until(self.shared.now().saturating_add(to_millis(timeout)))
    }

    /// As [`flush_for`](Self::flush_for) with an absolute virtual-ms
    /// deadline.
    ///
    /// # Errors
    ///
    /// See [`flush_for`](Self::flush_for).
    pub fn flush_until(&self, deadline_millis: u64) -> Result<bool> {
        self.shared.controller.try_begin_flush()?;

        let drained = self.wait_for_drain(deadline_millis);
        if drained {
            self.shared.send_log(CacheMessage::FlushCompleted);
        }
        self.shared.controller.end_flush();
        Ok(drained)
    }

    /// Drains the cache and terminates every worker thread within `timeout`.
    ///
    /// Returns `true` when the pipeline drained completely and all worker
    /// threads terminated. The inflight map is empty afterwards either way;
    /// surviving waiters are failed.
    ///
    /// # Errors
    ///
    /// Raises a shutdown error when the cache is already shut down.
    pub fn shutdown_for(&self, timeout: Duration) -> Result<bool> {
        let deadline = self.shared.now().saturating_add(to_millis(timeout));
        self.shared.controller.try_begin_shutdown()?;

        let drained = self.wait_for_drain(deadline);
        if drained {
            // The pipeline is empty; any straggling pool job is a dropped
            // result for an already-removed entry.
            self.shared.read_pool.join();
            self.shared.write_pool.join();
        }

        // Fail any survivors so no waiter hangs on a dead cache.
        for entry in self.shared.inflight.drain() {
            let mut core = entry.lock();
            core.state = EntryState::RemovedFromCache;
            entry.notify_waiters();
            drop(core);
        }

        self.shared.controller.complete_shutdown();

        // Workers poll with bounded sleeps; give them a few periods to exit.
        let grace = self.shared.max_sleep().saturating_mul(4);
        let join_by = std::time::Instant::now() + grace;
        let mut all_joined = true;
        for handle in self.threads.lock().drain(..) {
            while !handle.is_finished() && std::time::Instant::now() < join_by {
                std::thread::sleep(Duration::from_millis(1));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                all_joined = false;
            }
        }

        self.shared.send_log(CacheMessage::ShutdownCompleted);
        Ok(drained && all_joined)
    }

    /// Injects a caller-supplied message into the throttled logging and
    /// monitoring pipeline.
    pub fn log_non_standard_message(&self, severity: Severity, classifier: &str, text: impl Into<String>) {
        self.shared.send_log(CacheMessage::NonStandard {
            severity,
            classifier: classifier.to_owned(),
            text: text.into(),
        });
    }

    /// Produces a status snapshot, reusing a cached one up to `max_age` old.
    #[must_use]
    pub fn status(&self, max_age: Duration) -> Arc<CacheStatus> {
        let now = self.shared.now();
        let mut cached = self.status_cache.lock();
        if let Some((taken_at, status)) = cached.as_ref()
            && now.saturating_sub(*taken_at) <= to_millis(max_age)
        {
            return Arc::clone(status);
        }
        let fresh = Arc::new(self.build_status(now));
        *cached = Some((now, Arc::clone(&fresh)));
        fresh
    }

    // ----- internals ----------------------------------------------------

    fn resident_entry(&self, key: &A::Key) -> Result<Arc<Entry<A>>> {
        let shared = &self.shared;
        let now = shared.now();
        let deadline = now.saturating_add(to_millis(shared.options.main_queue_cache_time()));
        let limit = shared.options.max_cache_elements_hard_limit();

        match shared.inflight.lookup_or_create(key, limit, now, deadline) {
            Lookup::Existing(entry) => Ok(entry),
            Lookup::Created(entry) => {
                shared.enqueue_initial_read(Arc::clone(&entry));
                let _ = shared.main_tx.send(Arc::clone(&entry));
                Ok(entry)
            }
            Lookup::Full => Err(CacheError::CacheFull { limit }),
        }
    }

    fn check_stale_read_allowed(&self, core: &crate::entry::EntryCore<A>) -> Result<()> {
        if core.resync_failed_final && !self.shared.options.allow_data_reading_after_resync_failed_final() {
            return Err(self.failed_to_load(core));
        }
        Ok(())
    }

    fn failed_to_load(&self, core: &crate::entry::EntryCore<A>) -> CacheError {
        CacheError::FailedToLoad {
            cause: core
                .failure_cause
                .clone()
                .unwrap_or_else(|| "storage read failed".to_owned()),
        }
    }

    fn wait_for_drain(&self, deadline_millis: u64) -> bool {
        loop {
            if self.shared.drained() {
                return true;
            }
            let now = self.shared.now();
            if now >= deadline_millis {
                return false;
            }
            let slice = (deadline_millis - now).min(5).max(1);
            self.shared.clock.sleep(Duration::from_millis(slice));
        }
    }

    fn build_status(&self, now: u64) -> CacheStatus {
        let shared = &self.shared;
        let counters = &shared.monitor.counters;
        let load = |counter: &std::sync::atomic::AtomicU64| counter.load(std::sync::atomic::Ordering::Relaxed);

        let control_state = shared.controller.state();
        let read_pool_alive = shared.read_pool.is_alive();
        let write_pool_alive = shared.write_pool.is_alive();
        let everything_alive = control_state == ControlState::Running
            && shared.alive.all_alive()
            && read_pool_alive
            && write_pool_alive;

        let (full_cycle_buckets, time_since_access_buckets) = shared.monitor.bucket_snapshot();
        let (last_message_timestamps, last_logged_message_texts) = shared.monitor.message_snapshot();

        let class_latest = |severities: &[Severity]| -> (Option<u64>, Option<String>) {
            let mut latest: Option<(u64, usize)> = None;
            for severity in severities {
                let ordinal = severity.ordinal();
                if let Some(ts) = last_message_timestamps[ordinal]
                    && latest.is_none_or(|(best, _)| ts >= best)
                {
                    latest = Some((ts, ordinal));
                }
            }
            match latest {
                Some((ts, ordinal)) => (Some(ts), last_logged_message_texts[ordinal].clone()),
                None => (None, None),
            }
        };
        let (last_warn_timestamp, last_warn_text) = class_latest(&[Severity::Warn, Severity::ExternalWarn]);
        let (last_error_timestamp, last_error_text) =
            class_latest(&[Severity::Error, Severity::ExternalError, Severity::ExternalDataLoss]);
        let (last_fatal_timestamp, last_fatal_text) = class_latest(&[Severity::Fatal]);

        CacheStatus {
            control_state,
            taken_at_millis: now,
            everything_alive,
            read_queue_thread_alive: shared.alive.read_queue.load(std::sync::atomic::Ordering::Relaxed),
            write_queue_thread_alive: shared.alive.write_queue.load(std::sync::atomic::Ordering::Relaxed),
            main_queue_thread_alive: shared.alive.main_queue.load(std::sync::atomic::Ordering::Relaxed),
            return_queue_thread_alive: shared.alive.return_queue.load(std::sync::atomic::Ordering::Relaxed),
            read_pool_alive,
            write_pool_alive,
            current_cache_size: shared.inflight.len(),
            read_queue_size: shared.read_rx.len(),
            write_queue_size: shared.write_rx.len(),
            main_queue_size: shared.main_rx.len(),
            return_queue_size: shared.return_rx.len(),
            cache_read_attempts: load(&counters.cache_read_attempts),
            cache_read_successes: load(&counters.cache_read_successes),
            cache_read_timeouts: load(&counters.cache_read_timeouts),
            cache_preload_attempts: load(&counters.cache_preload_attempts),
            cache_write_attempts: load(&counters.cache_write_attempts),
            cache_write_successes: load(&counters.cache_write_successes),
            cache_write_too_many_updates: load(&counters.cache_write_too_many_updates),
            cache_write_rejected: load(&counters.cache_write_rejected),
            storage_read_attempts: load(&counters.storage_read_attempts),
            storage_read_successes: load(&counters.storage_read_successes),
            storage_read_failures: load(&counters.storage_read_failures),
            storage_read_retries: load(&counters.storage_read_retries),
            storage_read_initial_attempts: load(&counters.storage_read_initial_attempts),
            storage_read_initial_successes: load(&counters.storage_read_initial_successes),
            storage_read_initial_failed_final: load(&counters.storage_read_initial_failed_final),
            storage_read_refresh_attempts: load(&counters.storage_read_refresh_attempts),
            storage_read_refresh_successes: load(&counters.storage_read_refresh_successes),
            storage_read_refresh_failed_final: load(&counters.storage_read_refresh_failed_final),
            storage_read_refresh_too_late: load(&counters.storage_read_refresh_too_late),
            storage_read_merge_do_nothing: load(&counters.storage_read_merge_do_nothing),
            storage_write_attempts: load(&counters.storage_write_attempts),
            storage_write_successes: load(&counters.storage_write_successes),
            storage_write_failures: load(&counters.storage_write_failures),
            storage_write_retries: load(&counters.storage_write_retries),
            storage_write_failed_final: load(&counters.storage_write_failed_final),
            storage_write_data_lost: load(&counters.storage_write_data_lost),
            main_queue_processed: load(&counters.main_queue_processed),
            main_queue_requeues: load(&counters.main_queue_requeues),
            main_queue_removed_unrecoverable: load(&counters.main_queue_removed_unrecoverable),
            full_cycle_failures: load(&counters.full_cycle_failures),
            return_queue_processed: load(&counters.return_queue_processed),
            return_queue_retained: load(&counters.return_queue_retained),
            return_queue_requeues: load(&counters.return_queue_requeues),
            return_queue_expired_from_cache: load(&counters.return_queue_expired_from_cache),
            return_queue_removed_from_cache: load(&counters.return_queue_removed_from_cache),
            return_queue_item_not_retained_due_to_main_queue_size: load(
                &counters.return_queue_item_not_retained_due_to_main_queue_size,
            ),
            return_queue_negative_time_since_last_access_errors: load(
                &counters.return_queue_negative_time_since_last_access_errors,
            ),
            full_cycle_buckets,
            time_since_access_buckets,
            last_message_timestamps,
            last_logged_message_texts,
            last_warn_timestamp,
            last_warn_text,
            last_error_timestamp,
            last_error_text,
            last_fatal_timestamp,
            last_fatal_text,
        }
    }
}

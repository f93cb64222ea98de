// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-key cache entries and their state machine.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::adapter::CacheAdapter;

/// State of a cache entry.
///
/// `Loaded` and `ResyncPending` are the two client-readable states: a resync
/// in flight does not take the cached value away from clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryState {
    /// Allocated; the initial storage read has not completed.
    NotYetRead,
    /// The initial read completed; the entry serves clients.
    Loaded,
    /// Loaded, with a resync read in flight.
    ResyncPending,
    /// The entry has been dropped from the inflight map; any waiter still
    /// holding it must give up and re-resolve the key.
    RemovedFromCache,
    /// The initial read exhausted its retries; reads and writes against this
    /// entry fail permanently.
    ReadFailedFinal,
}

/// Mutable state of an entry, guarded by the entry's lock.
pub(crate) struct EntryCore<A: CacheAdapter> {
    pub state: EntryState,
    /// Client-visible composed value: the last storage read plus every
    /// accepted update applied on top.
    pub value: Option<A::Value>,
    /// Updates accepted since the last write-split point, in arrival order.
    pub pending_updates: VecDeque<A::Update>,
    /// Payload of a write that exhausted its retries, kept for merging.
    pub previous_failed_write: Option<A::Payload>,

    pub read_failure_count: u32,
    pub write_failure_count: u32,
    pub full_cycle_failure_count: u32,
    /// Sticky failure flag for the cycle in progress; folded into
    /// `full_cycle_failure_count` at main-queue processing.
    pub cycle_had_failure: bool,

    pub last_access_millis: u64,
    pub full_cycle_count: u64,
    pub in_main_queue_until: u64,
    pub in_return_queue_until: u64,
    pub return_queue_requeue_count: u32,

    /// A write descriptor for this entry is on the write queue or in a pool.
    pub write_pending: bool,
    /// Cycle number of the resync read currently in flight, if any.
    pub resync_inflight_epoch: Option<u64>,
    /// A resync read failed permanently; policy flags below refine behavior.
    pub resync_failed_final: bool,
    /// No further client updates are accepted.
    pub stop_collecting_updates: bool,
    /// Cause recorded at the failure that made this entry terminal.
    pub failure_cause: Option<String>,
}

impl<A: CacheAdapter> std::fmt::Debug for EntryCore<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryCore")
            .field("state", &self.state)
            .field("pending_updates_len", &self.pending_updates.len())
            .field("read_failure_count", &self.read_failure_count)
            .field("write_failure_count", &self.write_failure_count)
            .field("full_cycle_failure_count", &self.full_cycle_failure_count)
            .field("cycle_had_failure", &self.cycle_had_failure)
            .field("last_access_millis", &self.last_access_millis)
            .field("full_cycle_count", &self.full_cycle_count)
            .field("in_main_queue_until", &self.in_main_queue_until)
            .field("in_return_queue_until", &self.in_return_queue_until)
            .field("return_queue_requeue_count", &self.return_queue_requeue_count)
            .field("write_pending", &self.write_pending)
            .field("resync_inflight_epoch", &self.resync_inflight_epoch)
            .field("resync_failed_final", &self.resync_failed_final)
            .field("stop_collecting_updates", &self.stop_collecting_updates)
            .field("failure_cause", &self.failure_cause)
            .finish()
    }
}

impl<A: CacheAdapter> EntryCore<A> {
    fn new(now_millis: u64, main_queue_deadline: u64) -> Self {
        Self {
            state: EntryState::NotYetRead,
            value: None,
            pending_updates: VecDeque::new(),
            previous_failed_write: None,
            read_failure_count: 0,
            write_failure_count: 0,
            full_cycle_failure_count: 0,
            cycle_had_failure: false,
            last_access_millis: now_millis,
            full_cycle_count: 0,
            in_main_queue_until: main_queue_deadline,
            in_return_queue_until: 0,
            return_queue_requeue_count: 0,
            write_pending: false,
            resync_inflight_epoch: None,
            resync_failed_final: false,
            stop_collecting_updates: false,
            failure_cause: None,
        }
    }

    /// Snapshot of the pending updates for merge/split operations.
    pub fn pending_snapshot(&self) -> Vec<A::Update> {
        self.pending_updates.iter().cloned().collect()
    }
}

/// One cached key's entry: identity, locked core, and waiter signal.
///
/// The same `Arc<Entry>` is referenced from the inflight map and from
/// whichever queues currently carry the entry; state transitions happen
/// under the core lock and wake all waiters.
pub(crate) struct Entry<A: CacheAdapter> {
    key: A::Key,
    core: Mutex<EntryCore<A>>,
    signal: Condvar,
}

impl<A: CacheAdapter> std::fmt::Debug for Entry<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("core", &self.core)
            .finish()
    }
}

impl<A: CacheAdapter> Entry<A> {
    pub fn new(key: A::Key, now_millis: u64, main_queue_deadline: u64) -> Self {
        Self {
            key,
            core: Mutex::new(EntryCore::new(now_millis, main_queue_deadline)),
            signal: Condvar::new(),
        }
    }

    pub fn key(&self) -> &A::Key {
        &self.key
    }

    pub fn lock(&self) -> MutexGuard<'_, EntryCore<A>> {
        self.core.lock()
    }

    /// Wakes every client blocked on this entry.
    pub fn notify_waiters(&self) {
        self.signal.notify_all();
    }

    /// Blocks on the entry's signal for at most `timeout`.
    ///
    /// Spurious wakeups are possible; callers re-check state in a loop.
    pub fn wait(&self, guard: &mut MutexGuard<'_, EntryCore<A>>, timeout: std::time::Duration) {
        let _ = self.signal.wait_for(guard, timeout);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::testing::CharSeqBacking;

    type TestEntry = Entry<CharSeqBacking>;

    #[test]
    fn new_entry_starts_unread() {
        let entry = TestEntry::new("k".to_owned(), 100, 600);
        let core = entry.lock();

        assert_eq!(core.state, EntryState::NotYetRead);
        assert!(core.value.is_none());
        assert_eq!(core.last_access_millis, 100);
        assert_eq!(core.in_main_queue_until, 600);
        assert_eq!(core.full_cycle_count, 0);
    }

    #[test]
    fn notify_wakes_waiter() {
        let entry = Arc::new(TestEntry::new("k".to_owned(), 0, 0));
        let waiter = Arc::clone(&entry);

        let handle = std::thread::spawn(move || {
            let mut core = waiter.lock();
            while core.state != EntryState::Loaded {
                waiter.wait(&mut core, Duration::from_secs(5));
            }
        });

        {
            let mut core = entry.lock();
            core.state = EntryState::Loaded;
            core.value = Some(String::new());
        }
        entry.notify_waiters();

        handle.join().unwrap();
    }

    #[test]
    fn pending_snapshot_preserves_order() {
        let entry = TestEntry::new("k".to_owned(), 0, 0);
        let mut core = entry.lock();
        core.pending_updates.push_back('a');
        core.pending_updates.push_back('b');
        core.pending_updates.push_back('c');

        assert_eq!(core.pending_snapshot(), vec!['a', 'b', 'c']);
    }
}

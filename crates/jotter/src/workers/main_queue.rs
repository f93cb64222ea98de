// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Main-queue worker: the per-cycle decision point.
//!
//! When an entry's main-queue residency expires, this worker splits the
//! accumulated updates into a write payload, schedules a resync read, and
//! moves the entry onto the return queue.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::adapter::CacheAdapter;
use crate::core::{ReadKind, ReadRequest, Shared, WriteRequest};
use crate::entry::{Entry, EntryCore, EntryState};
use crate::events::CacheEvent;
use crate::message::CacheMessage;
use crate::monitor::bump;

impl<A: CacheAdapter> Shared<A> {
    /// Body of the main-queue worker thread.
    pub(crate) fn main_queue_loop(self: Arc<Self>) {
        self.alive.main_queue.store(true, Ordering::Relaxed);
        loop {
            if self.controller.is_terminated() {
                break;
            }
            match self.main_rx.recv_timeout(self.max_sleep()) {
                Ok(entry) => self.process_main_entry(&entry),
                Err(flume::RecvTimeoutError::Timeout) => {}
                Err(flume::RecvTimeoutError::Disconnected) => break,
            }
        }
        self.alive.main_queue.store(false, Ordering::Relaxed);
    }

    fn process_main_entry(&self, entry: &Arc<Entry<A>>) {
        let deadline = entry.lock().in_main_queue_until;
        // Above the soft size target the queue ticks aggressively instead of
        // honoring residency.
        self.wait_for_queue_deadline(deadline, || {
            self.main_rx.len() > self.options.main_queue_max_target_size()
        });
        if self.controller.is_terminated() {
            return;
        }

        bump(&self.monitor.counters.main_queue_processed);
        let now = self.now();
        let draining = self.controller.is_draining();

        let mut core = entry.lock();
        match core.state {
            EntryState::RemovedFromCache => {}
            EntryState::NotYetRead => self.process_unloaded_entry(entry, &mut core, now, draining),
            EntryState::ReadFailedFinal => {
                // Nothing to write; park on the return queue until expiry.
                self.move_to_return_queue(entry, &mut core, now, draining);
            }
            EntryState::Loaded | EntryState::ResyncPending => {
                self.process_loaded_entry(entry, &mut core, now, draining);
            }
        }
    }

    /// The initial read has not completed within a full residency period:
    /// either the read is slow or it is burning retries.
    fn process_unloaded_entry(&self, entry: &Arc<Entry<A>>, core: &mut EntryCore<A>, now: u64, draining: bool) {
        if self.account_cycle_failure(core) {
            self.remove_unrecoverable(entry, core);
            return;
        }
        if draining {
            // Nothing loaded, nothing to flush; let the return queue expire it.
            self.move_to_return_queue(entry, core, now, draining);
            return;
        }
        bump(&self.monitor.counters.main_queue_requeues);
        core.in_main_queue_until = now.saturating_add(crate::config::to_millis(self.options.main_queue_cache_time()));
        let _ = self.main_tx.send(Arc::clone(entry));
    }

    fn process_loaded_entry(&self, entry: &Arc<Entry<A>>, core: &mut EntryCore<A>, now: u64, draining: bool) {
        if core.resync_failed_final && !self.options.allow_data_writing_after_resync_failed_final() {
            let lost_updates = core.pending_updates.len();
            if lost_updates > 0 || core.previous_failed_write.is_some() {
                bump(&self.monitor.counters.storage_write_data_lost);
            }
            let key = self.render_key(entry.key());
            self.remove_entry_locked(entry, core);
            self.send_log(CacheMessage::RemovedUnrecoverable {
                key: key.clone(),
                lost_updates,
            });
            self.fire_event(|| CacheEvent::EntryRemoved { key });
            return;
        }

        self.split_and_enqueue_write(entry, core);
        self.schedule_resync(entry, core, draining);

        if self.account_cycle_failure(core) {
            self.remove_unrecoverable(entry, core);
            return;
        }
        self.move_to_return_queue(entry, core, now, draining);
    }

    /// Computes the write split and enqueues the resulting payload, if any.
    ///
    /// The split point defines the per-key ordering guarantee: the payload
    /// contains exactly the updates that arrived before this moment, plus a
    /// previously-failed payload when merging is allowed. With merging
    /// disabled, a failed payload is retried alone and the fresh updates stay
    /// pending for the next cycle.
    fn split_and_enqueue_write(&self, entry: &Arc<Entry<A>>, core: &mut EntryCore<A>) {
        if core.write_pending {
            // The previous cycle's write has not resolved; never put two
            // writes for one key in flight.
            return;
        }

        let previous = core.previous_failed_write.take();
        let has_updates = !core.pending_updates.is_empty();

        let payload = match (previous, has_updates) {
            (None, false) => None,
            (None, true) => {
                let updates: Vec<A::Update> = core.pending_updates.drain(..).collect();
                Some(self.adapter.collect_payload(&updates))
            }
            (Some(earlier), true) if self.options.can_merge_writes() => {
                let updates: Vec<A::Update> = core.pending_updates.drain(..).collect();
                let later = self.adapter.collect_payload(&updates);
                Some(self.adapter.merge_payloads(&earlier, &later))
            }
            (Some(earlier), _) => {
                // Retry the failed payload alone; fresh updates keep pending.
                Some(earlier)
            }
        };

        if let Some(payload) = payload {
            core.write_pending = true;
            core.write_failure_count = 0;
            let _ = self.write_tx.send(WriteRequest {
                entry: Arc::clone(entry),
                payload,
            });
            self.fire_event(|| CacheEvent::WriteEnqueued {
                key: self.render_key(entry.key()),
            });
        }
    }

    fn schedule_resync(&self, entry: &Arc<Entry<A>>, core: &mut EntryCore<A>, draining: bool) {
        if draining || core.resync_failed_final || core.resync_inflight_epoch.is_some() {
            return;
        }
        core.state = EntryState::ResyncPending;
        core.resync_inflight_epoch = Some(core.full_cycle_count);
        core.read_failure_count = 0;
        let _ = self.read_tx.send(ReadRequest {
            entry: Arc::clone(entry),
            kind: ReadKind::Resync {
                epoch: core.full_cycle_count,
            },
        });
        self.fire_event(|| CacheEvent::ResyncScheduled {
            key: self.render_key(entry.key()),
        });
    }

    fn move_to_return_queue(&self, entry: &Arc<Entry<A>>, core: &mut EntryCore<A>, now: u64, draining: bool) {
        let residency = if draining {
            0
        } else {
            crate::config::to_millis(self.options.return_queue_cache_time_min())
        };
        core.in_return_queue_until = now.saturating_add(residency);
        core.return_queue_requeue_count = 0;
        let _ = self.return_tx.send(Arc::clone(entry));
    }

    fn remove_unrecoverable(&self, entry: &Arc<Entry<A>>, core: &mut EntryCore<A>) {
        bump(&self.monitor.counters.main_queue_removed_unrecoverable);
        let lost_updates = core.pending_updates.len();
        if lost_updates > 0 || core.previous_failed_write.is_some() {
            bump(&self.monitor.counters.storage_write_data_lost);
        }
        let key = self.render_key(entry.key());
        self.remove_entry_locked(entry, core);
        self.send_log(CacheMessage::RemovedUnrecoverable {
            key: key.clone(),
            lost_updates,
        });
        self.fire_event(|| CacheEvent::EntryRemoved { key });
    }
}

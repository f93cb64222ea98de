// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Return-queue worker: retain, expire, or remove.
//!
//! After the write for a cycle has been dispatched, entries wait here for
//! `return_queue_cache_time_min`. Recently-touched entries are retained for
//! another cycle (space permitting); idle entries expire. Entries with a
//! write still in flight are re-queued a bounded number of times so eviction
//! does not race the write.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::adapter::CacheAdapter;
use crate::config::to_millis;
use crate::core::Shared;
use crate::entry::{Entry, EntryCore, EntryState};
use crate::events::CacheEvent;
use crate::message::CacheMessage;
use crate::monitor::bump;

impl<A: CacheAdapter> Shared<A> {
    /// Body of the return-queue worker thread.
    pub(crate) fn return_queue_loop(self: Arc<Self>) {
        self.alive.return_queue.store(true, Ordering::Relaxed);
        loop {
            if self.controller.is_terminated() {
                break;
            }
            match self.return_rx.recv_timeout(self.max_sleep()) {
                Ok(entry) => self.process_return_entry(&entry),
                Err(flume::RecvTimeoutError::Timeout) => {}
                Err(flume::RecvTimeoutError::Disconnected) => break,
            }
        }
        self.alive.return_queue.store(false, Ordering::Relaxed);
    }

    fn process_return_entry(&self, entry: &Arc<Entry<A>>) {
        let deadline = entry.lock().in_return_queue_until;
        self.wait_for_queue_deadline(deadline, || false);
        if self.controller.is_terminated() {
            return;
        }

        bump(&self.monitor.counters.return_queue_processed);
        let now = self.now();
        let draining = self.controller.is_draining();

        let mut core = entry.lock();
        if core.state == EntryState::RemovedFromCache {
            return;
        }

        if core.write_pending {
            if draining {
                // Flush and shutdown re-queue freely; the drain deadline
                // bounds the loop. A short real sleep keeps this from
                // spinning while the write resolves.
                core.in_return_queue_until = now;
                drop(core);
                let _ = self.return_tx.send(Arc::clone(entry));
                self.clock.sleep(Duration::from_millis(1));
                return;
            }
            if core.return_queue_requeue_count < self.options.return_queue_max_requeue_count() {
                core.return_queue_requeue_count += 1;
                bump(&self.monitor.counters.return_queue_requeues);
                core.in_return_queue_until = now.saturating_add(to_millis(self.options.return_queue_cache_time_min()));
                drop(core);
                let _ = self.return_tx.send(Arc::clone(entry));
                return;
            }
            // Budget exhausted: fall through to the eviction decision. The
            // write descriptor holds its own payload, so eviction cannot
            // lose it.
        }

        // Histograms are recorded at the decision point, once per return-queue
        // pass that reaches a decision.
        self.monitor.record_full_cycles(
            core.full_cycle_count,
            self.options.monitoring_full_cache_cycles_thresholds(),
        );
        let idle = self.idle_millis(entry, &core, now);
        self.monitor
            .record_time_since_access(idle, self.options.monitoring_time_since_access_thresholds());

        if draining {
            self.expire_entry(entry, &mut core);
            return;
        }

        if core.state == EntryState::NotYetRead {
            // An unloaded entry on the return queue is an anomaly; remove it
            // through the error path.
            bump(&self.monitor.counters.return_queue_removed_from_cache);
            let key = self.render_key(entry.key());
            self.remove_entry_locked(entry, &mut core);
            self.fire_event(|| CacheEvent::EntryRemoved { key });
            return;
        }

        if idle < to_millis(self.options.untouched_item_cache_expiration_delay()) {
            if self.main_rx.len() < self.options.main_queue_max_target_size() {
                self.retain_entry(entry, &mut core, now);
            } else {
                bump(&self.monitor.counters.return_queue_item_not_retained_due_to_main_queue_size);
                let key = self.render_key(entry.key());
                self.expire_entry(entry, &mut core);
                drop(core);
                self.send_log(CacheMessage::NotRetainedDueToMainQueueSize { key });
            }
        } else {
            self.expire_entry(entry, &mut core);
        }
    }

    fn idle_millis(&self, entry: &Arc<Entry<A>>, core: &EntryCore<A>, now: u64) -> u64 {
        if core.last_access_millis > now {
            bump(&self.monitor.counters.return_queue_negative_time_since_last_access_errors);
            self.send_log(CacheMessage::NegativeTimeSinceLastAccess {
                key: self.render_key(entry.key()),
            });
            return 0;
        }
        now - core.last_access_millis
    }

    fn retain_entry(&self, entry: &Arc<Entry<A>>, core: &mut EntryCore<A>, now: u64) {
        core.full_cycle_count += 1;
        core.in_main_queue_until = now.saturating_add(to_millis(self.options.main_queue_cache_time()));
        bump(&self.monitor.counters.return_queue_retained);
        let _ = self.main_tx.send(Arc::clone(entry));
        self.fire_event(|| CacheEvent::EntryRetained {
            key: self.render_key(entry.key()),
        });
    }

    fn expire_entry(&self, entry: &Arc<Entry<A>>, core: &mut EntryCore<A>) {
        bump(&self.monitor.counters.return_queue_expired_from_cache);
        let key = self.render_key(entry.key());
        self.remove_entry_locked(entry, core);
        self.fire_event(|| CacheEvent::EntryExpired { key });
    }
}

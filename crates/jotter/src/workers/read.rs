// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Read-queue worker: initial loads and resync reads.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::adapter::{CacheAdapter, MergeDecision};
use crate::config::ResyncTooLateAction;
use crate::core::{ReadKind, ReadRequest, Shared};
use crate::entry::{Entry, EntryState};
use crate::events::CacheEvent;
use crate::message::CacheMessage;
use crate::monitor::bump;

impl<A: CacheAdapter> Shared<A> {
    /// Body of the read-queue worker thread.
    pub(crate) fn read_queue_loop(self: Arc<Self>) {
        self.alive.read_queue.store(true, Ordering::Relaxed);
        loop {
            if self.controller.is_terminated() {
                break;
            }
            match self.read_rx.recv_timeout(self.max_sleep()) {
                Ok(first) => {
                    let window = self.options.read_queue_batching_delay();
                    if window.is_zero() {
                        Self::dispatch_read(&self, first);
                    } else {
                        let mut batch = vec![first];
                        let deadline = Instant::now() + window;
                        while let Ok(more) = self.read_rx.recv_deadline(deadline) {
                            batch.push(more);
                        }
                        self.adapter.read_batch_opened(batch.len());
                        for request in batch {
                            Self::dispatch_read(&self, request);
                        }
                        self.adapter.read_batch_closed();
                    }
                }
                Err(flume::RecvTimeoutError::Timeout) => {}
                Err(flume::RecvTimeoutError::Disconnected) => break,
            }
        }
        self.alive.read_queue.store(false, Ordering::Relaxed);
    }

    fn dispatch_read(shared: &Arc<Self>, request: ReadRequest<A>) {
        let worker = Arc::clone(shared);
        shared.read_pool.execute(move || worker.perform_read(request));
    }

    fn perform_read(&self, request: ReadRequest<A>) {
        let counters = &self.monitor.counters;
        bump(&counters.storage_read_attempts);
        match request.kind {
            ReadKind::Initial => bump(&counters.storage_read_initial_attempts),
            ReadKind::Resync { .. } => bump(&counters.storage_read_refresh_attempts),
        }

        let key = request.entry.key().clone();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.adapter.read(&key)));
        match outcome {
            Ok(Ok(value)) => {
                bump(&counters.storage_read_successes);
                self.complete_read_success(&request.entry, request.kind, value);
            }
            Ok(Err(error)) => self.complete_read_failure(&request.entry, request.kind, error.to_string()),
            Err(_) => {
                self.send_log(CacheMessage::StoragePanic {
                    key: self.render_key(&key),
                });
                self.complete_read_failure(&request.entry, request.kind, "storage read panicked".to_owned());
            }
        }
    }

    fn complete_read_success(&self, entry: &Arc<Entry<A>>, kind: ReadKind, value: A::Value) {
        match kind {
            ReadKind::Initial => self.complete_initial_success(entry, value),
            ReadKind::Resync { epoch } => self.complete_resync_success(entry, epoch, value),
        }
    }

    fn complete_initial_success(&self, entry: &Arc<Entry<A>>, value: A::Value) {
        let counters = &self.monitor.counters;
        {
            let mut core = entry.lock();
            // Anything but not-yet-read means the entry moved on without us
            // (removed, or a stray duplicate read); the result is dropped.
            if core.state != EntryState::NotYetRead {
                return;
            }
            core.value = Some(value);
            core.state = EntryState::Loaded;
            core.read_failure_count = 0;
            entry.notify_waiters();
        }
        bump(&counters.storage_read_initial_successes);
        self.fire_event(|| CacheEvent::InitialLoadCompleted {
            key: self.render_key(entry.key()),
        });
    }

    fn complete_resync_success(&self, entry: &Arc<Entry<A>>, epoch: u64, value: A::Value) {
        let counters = &self.monitor.counters;
        let key = self.render_key(entry.key());

        let mut core = entry.lock();
        if core.state == EntryState::RemovedFromCache {
            return;
        }

        let on_time = core.resync_inflight_epoch == Some(epoch) && core.full_cycle_count == epoch;
        if !on_time {
            let merge_late = self.options.accept_out_of_order_reads()
                || self.options.resync_too_late_action() == ResyncTooLateAction::MergeAnyway;
            if !merge_late {
                bump(&counters.storage_read_refresh_too_late);
                if core.resync_inflight_epoch == Some(epoch) {
                    core.resync_inflight_epoch = None;
                    if core.state == EntryState::ResyncPending {
                        core.state = EntryState::Loaded;
                    }
                }
                drop(core);
                self.send_log(CacheMessage::ResyncTooLate { key });
                return;
            }
        }

        bump(&counters.storage_read_refresh_successes);

        let decision = self.adapter.resync_decision(entry.key(), !core.pending_updates.is_empty());
        match decision {
            MergeDecision::SetDirectly => {
                core.value = Some(value);
                core.pending_updates.clear();
            }
            MergeDecision::MergeData => {
                let pending = core.pending_snapshot();
                core.value = Some(self.adapter.resync_merge(value, &pending));
            }
            MergeDecision::ClearReadPendingStatus => {}
            MergeDecision::RemoveFromCache => {
                self.remove_entry_locked(entry, &mut core);
                drop(core);
                self.fire_event(|| CacheEvent::EntryRemoved { key });
                return;
            }
            MergeDecision::DoNothing => {
                bump(&counters.storage_read_merge_do_nothing);
                drop(core);
                self.send_log(CacheMessage::MergeDoNothing { key });
                return;
            }
        }

        if core.resync_inflight_epoch == Some(epoch) {
            core.resync_inflight_epoch = None;
        }
        if core.state == EntryState::ResyncPending {
            core.state = EntryState::Loaded;
        }
        core.read_failure_count = 0;
        entry.notify_waiters();
    }

    fn complete_read_failure(&self, entry: &Arc<Entry<A>>, kind: ReadKind, cause: String) {
        let counters = &self.monitor.counters;
        bump(&counters.storage_read_failures);

        let key = self.render_key(entry.key());
        let mut core = entry.lock();
        if core.state == EntryState::RemovedFromCache {
            return;
        }

        core.cycle_had_failure = true;
        core.read_failure_count += 1;

        if core.read_failure_count <= self.options.read_failure_max_retry_count() {
            bump(&counters.storage_read_retries);
            drop(core);
            self.send_log(CacheMessage::ReadRetryIssued { key });
            let _ = self.read_tx.send(ReadRequest {
                entry: Arc::clone(entry),
                kind,
            });
            return;
        }

        match kind {
            ReadKind::Initial => {
                bump(&counters.storage_read_initial_failed_final);
                let removed = match self.options.initial_read_failed_final_action() {
                    crate::config::ReadFailedFinalAction::RemoveFromCache => {
                        self.remove_entry_locked(entry, &mut core);
                        true
                    }
                    crate::config::ReadFailedFinalAction::KeepAndThrow => {
                        core.state = EntryState::ReadFailedFinal;
                        core.failure_cause = Some(cause.clone());
                        entry.notify_waiters();
                        false
                    }
                };
                drop(core);
                self.send_log(CacheMessage::ReadInitialFailedFinal { key: key.clone(), cause });
                if removed {
                    self.fire_event(|| CacheEvent::EntryRemoved { key });
                }
            }
            ReadKind::Resync { epoch } => {
                bump(&counters.storage_read_refresh_failed_final);
                let removed = match self.options.resync_failed_final_action() {
                    crate::config::ResyncFailedFinalAction::RemoveFromCache => {
                        self.remove_entry_locked(entry, &mut core);
                        true
                    }
                    crate::config::ResyncFailedFinalAction::StopCollectingUpdates => {
                        core.resync_failed_final = true;
                        core.stop_collecting_updates = true;
                        core.failure_cause = Some(cause.clone());
                        Self::clear_resync_status(&mut core, epoch);
                        entry.notify_waiters();
                        false
                    }
                    crate::config::ResyncFailedFinalAction::KeepCollectingUpdates => {
                        core.resync_failed_final = true;
                        core.failure_cause = Some(cause.clone());
                        Self::clear_resync_status(&mut core, epoch);
                        entry.notify_waiters();
                        false
                    }
                };
                drop(core);
                self.send_log(CacheMessage::ResyncFailedFinal { key: key.clone(), cause });
                if removed {
                    self.fire_event(|| CacheEvent::EntryRemoved { key });
                }
            }
        }
    }

    fn clear_resync_status(core: &mut crate::entry::EntryCore<A>, epoch: u64) {
        if core.resync_inflight_epoch == Some(epoch) {
            core.resync_inflight_epoch = None;
        }
        if core.state == EntryState::ResyncPending {
            core.state = EntryState::Loaded;
        }
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Write-queue worker: pushes accumulated payloads out to storage.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::adapter::CacheAdapter;
use crate::core::{Shared, WriteRequest};
use crate::entry::Entry;
use crate::events::CacheEvent;
use crate::message::CacheMessage;
use crate::monitor::bump;

impl<A: CacheAdapter> Shared<A> {
    /// Body of the write-queue worker thread.
    pub(crate) fn write_queue_loop(self: Arc<Self>) {
        self.alive.write_queue.store(true, Ordering::Relaxed);
        loop {
            if self.controller.is_terminated() {
                break;
            }
            match self.write_rx.recv_timeout(self.max_sleep()) {
                Ok(first) => {
                    let window = self.options.write_queue_batching_delay();
                    if window.is_zero() {
                        Self::dispatch_write(&self, first);
                    } else {
                        let mut batch = vec![first];
                        let deadline = Instant::now() + window;
                        while let Ok(more) = self.write_rx.recv_deadline(deadline) {
                            batch.push(more);
                        }
                        self.adapter.write_batch_opened(batch.len());
                        for request in batch {
                            Self::dispatch_write(&self, request);
                        }
                        self.adapter.write_batch_closed();
                    }
                }
                Err(flume::RecvTimeoutError::Timeout) => {}
                Err(flume::RecvTimeoutError::Disconnected) => break,
            }
        }
        self.alive.write_queue.store(false, Ordering::Relaxed);
    }

    fn dispatch_write(shared: &Arc<Self>, request: WriteRequest<A>) {
        let worker = Arc::clone(shared);
        shared.write_pool.execute(move || worker.perform_write(request));
    }

    fn perform_write(&self, request: WriteRequest<A>) {
        let counters = &self.monitor.counters;
        bump(&counters.storage_write_attempts);

        let key = request.entry.key().clone();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.adapter.write(&key, &request.payload)));
        match outcome {
            Ok(Ok(())) => {
                bump(&counters.storage_write_successes);
                self.complete_write_success(&request.entry);
            }
            Ok(Err(error)) => self.complete_write_failure(request, error.to_string()),
            Err(_) => {
                self.send_log(CacheMessage::StoragePanic {
                    key: self.render_key(&key),
                });
                self.complete_write_failure(request, "storage write panicked".to_owned());
            }
        }
    }

    fn complete_write_success(&self, entry: &Arc<Entry<A>>) {
        {
            let mut core = entry.lock();
            core.write_pending = false;
            core.write_failure_count = 0;
            entry.notify_waiters();
        }
        self.fire_event(|| CacheEvent::WriteCompleted {
            key: self.render_key(entry.key()),
        });
    }

    fn complete_write_failure(&self, request: WriteRequest<A>, cause: String) {
        let counters = &self.monitor.counters;
        bump(&counters.storage_write_failures);

        let entry = Arc::clone(&request.entry);
        let key = self.render_key(entry.key());

        let mut core = entry.lock();
        core.cycle_had_failure = true;
        core.write_failure_count += 1;

        if core.write_failure_count <= self.options.write_failure_max_retry_count() {
            bump(&counters.storage_write_retries);
            drop(core);
            self.send_log(CacheMessage::WriteRetryIssued { key });
            let _ = self.write_tx.send(request);
            return;
        }

        bump(&counters.storage_write_failed_final);
        core.write_pending = false;
        tracing::debug!(cache = self.options.name(), key = %key, cause = %cause, "write exhausted its retry budget");

        if self.options.can_merge_writes() {
            core.previous_failed_write = Some(match core.previous_failed_write.take() {
                Some(earlier) => self.adapter.merge_payloads(&earlier, &request.payload),
                None => request.payload,
            });
            entry.notify_waiters();
            drop(core);
            self.send_log(CacheMessage::WriteFailedFinalPayloadKept { key });
        } else {
            bump(&counters.storage_write_data_lost);
            entry.notify_waiters();
            drop(core);
            self.send_log(CacheMessage::WriteFailedFinalDataLost { key });
        }
    }
}

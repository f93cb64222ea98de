// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The four queue worker loops.
//!
//! Each worker is a dedicated thread looping on its queue with poll timeouts
//! bounded by `max_sleep_time`, so control-state changes are observed with
//! bounded latency. Storage-facing workers (read, write) optionally dispatch
//! into their thread pools; pipeline workers (main, return) make the
//! per-cycle scheduling decisions.

mod main_queue;
mod read;
mod return_queue;
mod write;

use std::time::Duration;

use crate::adapter::CacheAdapter;
use crate::config::to_millis;
use crate::core::Shared;

impl<A: CacheAdapter> Shared<A> {
    /// Sleeps toward a virtual-ms queue deadline in bounded increments.
    ///
    /// Returns early when the cache starts draining, terminates, or the
    /// caller's acceleration predicate fires. No single block exceeds
    /// `max_sleep_time`.
    fn wait_for_queue_deadline(&self, deadline_millis: u64, accelerate: impl Fn() -> bool) {
        loop {
            if self.controller.is_draining() || self.controller.is_terminated() {
                return;
            }
            if accelerate() {
                return;
            }
            let now = self.now();
            if now >= deadline_millis {
                return;
            }
            let remaining = (deadline_millis - now).min(to_millis(self.max_sleep()));
            self.clock.sleep(Duration::from_millis(remaining));
        }
    }
}

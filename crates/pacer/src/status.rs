// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Pacer status snapshots.

/// An immutable snapshot of the pacer's operational state.
///
/// Mirrors the cache status shape: per-thread alive flags, queue depths, and
/// counters copied with relaxed atomics.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PacerStatus {
    /// True while the pacer is running and every thread and pool is alive.
    pub everything_alive: bool,
    /// Main-queue dispatch thread liveness.
    pub main_thread_alive: bool,
    /// Delay-queue thread liveness.
    pub delay_thread_alive: bool,
    /// Executor pool liveness.
    pub executor_pool_alive: bool,

    /// Requests waiting on the main queue.
    pub queue_size: usize,
    /// Requests parked in the delay queue.
    pub delayed_count: usize,
    /// Requests admitted but not yet done or failed.
    pub in_flight: usize,

    /// Requests accepted by `submit`.
    pub submitted: u64,
    /// Requests that completed successfully.
    pub succeeded: u64,
    /// Individual attempts that failed.
    pub failed_attempts: u64,
    /// Requests that exhausted their attempt budget.
    pub failed_final: u64,
    /// Retries parked on the delay queue.
    pub delayed_retries: u64,
}

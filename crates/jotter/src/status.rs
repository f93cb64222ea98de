// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Point-in-time cache status snapshots.

use crate::control::ControlState;
use crate::message::SEVERITY_COUNT;

/// An immutable snapshot of the cache's operational state.
///
/// Produced by [`WriteBehindCache::status`](crate::WriteBehindCache::status).
/// Counter fields are copied with relaxed atomics: each individual value is
/// exact at some moment near the snapshot, but the set is not a consistent
/// cut of the cache's history.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct CacheStatus {
    /// Control state at snapshot time.
    pub control_state: ControlState,
    /// Virtual-ms timestamp the snapshot was taken at.
    pub taken_at_millis: u64,

    /// True while the cache is running and every worker thread and pool is
    /// alive.
    pub everything_alive: bool,
    /// Read-queue worker thread liveness.
    pub read_queue_thread_alive: bool,
    /// Write-queue worker thread liveness.
    pub write_queue_thread_alive: bool,
    /// Main-queue worker thread liveness.
    pub main_queue_thread_alive: bool,
    /// Return-queue worker thread liveness.
    pub return_queue_thread_alive: bool,
    /// Read pool liveness; true when the pool is disabled (inline reads).
    pub read_pool_alive: bool,
    /// Write pool liveness; true when the pool is disabled (inline writes).
    pub write_pool_alive: bool,

    /// Number of entries resident in the inflight map.
    pub current_cache_size: usize,
    /// Read-queue depth.
    pub read_queue_size: usize,
    /// Write-queue depth.
    pub write_queue_size: usize,
    /// Main-queue depth.
    pub main_queue_size: usize,
    /// Return-queue depth.
    pub return_queue_size: usize,

    /// Client read attempts (all `read_*` entry points).
    pub cache_read_attempts: u64,
    /// Client reads that returned a value.
    pub cache_read_successes: u64,
    /// Client reads that timed out waiting for load.
    pub cache_read_timeouts: u64,
    /// Preload calls.
    pub cache_preload_attempts: u64,
    /// Client write attempts.
    pub cache_write_attempts: u64,
    /// Client writes accepted.
    pub cache_write_successes: u64,
    /// Client writes refused because the pending-update cap was reached.
    pub cache_write_too_many_updates: u64,
    /// Client writes refused for policy reasons other than the update cap.
    pub cache_write_rejected: u64,

    /// Storage read calls issued (initial + resync, including retries).
    pub storage_read_attempts: u64,
    /// Storage read calls that succeeded.
    pub storage_read_successes: u64,
    /// Storage read calls that failed.
    pub storage_read_failures: u64,
    /// Storage reads re-queued for retry.
    pub storage_read_retries: u64,
    /// Initial-read calls issued.
    pub storage_read_initial_attempts: u64,
    /// Initial-read calls that succeeded.
    pub storage_read_initial_successes: u64,
    /// Initial reads that exhausted their retry budget.
    pub storage_read_initial_failed_final: u64,
    /// Resync-read calls issued.
    pub storage_read_refresh_attempts: u64,
    /// Resync-read calls that succeeded.
    pub storage_read_refresh_successes: u64,
    /// Resync reads that exhausted their retry budget.
    pub storage_read_refresh_failed_final: u64,
    /// Resync reads dropped for arriving past the merge point.
    pub storage_read_refresh_too_late: u64,
    /// Resyncs resolved with the do-nothing merge decision.
    pub storage_read_merge_do_nothing: u64,

    /// Storage write calls issued (including retries).
    pub storage_write_attempts: u64,
    /// Storage write calls that succeeded.
    pub storage_write_successes: u64,
    /// Storage write calls that failed.
    pub storage_write_failures: u64,
    /// Storage writes re-queued for retry.
    pub storage_write_retries: u64,
    /// Writes that exhausted their retry budget.
    pub storage_write_failed_final: u64,
    /// Write payloads dropped without reaching storage.
    pub storage_write_data_lost: u64,

    /// Entries processed by the main-queue worker.
    pub main_queue_processed: u64,
    /// Entries re-queued to the main queue before loading completed.
    pub main_queue_requeues: u64,
    /// Entries removed after exhausting the cycle-level failure budget.
    pub main_queue_removed_unrecoverable: u64,
    /// Cycles that completed with at least one failure.
    pub full_cycle_failures: u64,

    /// Entries processed by the return-queue worker.
    pub return_queue_processed: u64,
    /// Entries retained (moved back to the main queue).
    pub return_queue_retained: u64,
    /// Entries re-queued to wait out a pending write.
    pub return_queue_requeues: u64,
    /// Entries expired through the normal path.
    pub return_queue_expired_from_cache: u64,
    /// Entries removed through the error path.
    pub return_queue_removed_from_cache: u64,
    /// Entries not retained because the main queue was at its size target.
    pub return_queue_item_not_retained_due_to_main_queue_size: u64,
    /// Negative time-since-last-access observations (clock anomalies).
    pub return_queue_negative_time_since_last_access_errors: u64,

    /// Histogram of full cycles spent in cache, bucketed by the configured
    /// thresholds; the sixth bucket is overflow.
    pub full_cycle_buckets: [u64; 6],
    /// Histogram of time since last access at return-queue decisions.
    pub time_since_access_buckets: [u64; 6],

    /// Virtual-ms timestamp of the last message offered per severity ordinal.
    pub last_message_timestamps: [Option<u64>; SEVERITY_COUNT],
    /// Text of the last message actually logged per severity ordinal.
    pub last_logged_message_texts: [Option<String>; SEVERITY_COUNT],

    /// Timestamp of the most recent message at WARN severity or above.
    pub last_warn_timestamp: Option<u64>,
    /// Text of the most recent logged message at WARN severity or above.
    pub last_warn_text: Option<String>,
    /// Timestamp of the most recent message at ERROR severity or above.
    pub last_error_timestamp: Option<u64>,
    /// Text of the most recent logged message at ERROR severity or above.
    pub last_error_text: Option<String>,
    /// Timestamp of the most recent FATAL message.
    pub last_fatal_timestamp: Option<u64>,
    /// Text of the most recent logged FATAL message.
    pub last_fatal_text: Option<String>,
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache configuration: a typed options object with runtime-mutable tunables.
//!
//! Most tunables are atomic-backed so operators can adjust a running cache;
//! each change becomes visible at the next scheduling decision that reads the
//! field. Only single-field visibility is guaranteed: there is no
//! transactional view across fields.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) fn to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Policy applied when an entry's *initial* read has exhausted its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadFailedFinalAction {
    /// Drop the entry; waiters fail as removed-from-cache.
    RemoveFromCache = 0,
    /// Keep the entry in a terminal failed state; subsequent reads and writes
    /// against it fail with a failed-to-load error.
    KeepAndThrow = 1,
}

impl ReadFailedFinalAction {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::RemoveFromCache,
            _ => Self::KeepAndThrow,
        }
    }
}

/// Policy applied when a resync read has exhausted its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResyncFailedFinalAction {
    /// Drop the entry.
    RemoveFromCache = 0,
    /// Keep the entry but refuse further client updates.
    StopCollectingUpdates = 1,
    /// Keep the entry and keep accepting client updates.
    KeepCollectingUpdates = 2,
}

impl ResyncFailedFinalAction {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::RemoveFromCache,
            1 => Self::StopCollectingUpdates,
            _ => Self::KeepCollectingUpdates,
        }
    }
}

/// Policy applied when a resync read arrives after the entry has advanced
/// past the point where the data could be merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResyncTooLateAction {
    /// Drop the late read and count the occurrence.
    Drop = 0,
    /// Merge the late read anyway.
    MergeAnyway = 1,
}

impl ResyncTooLateAction {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Drop,
            _ => Self::MergeAnyway,
        }
    }
}

/// Size of an I/O thread pool as a `(min, max)` pair.
///
/// `(-1, -1)` disables the pool entirely: storage calls then run inline on
/// the owning queue worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSize {
    /// Initial number of threads, or `-1` for a disabled pool.
    pub min: i32,
    /// Maximum number of threads, or `-1` for a disabled pool.
    pub max: i32,
}

impl PoolSize {
    /// A disabled pool: storage calls execute inline.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { min: -1, max: -1 }
    }

    /// A pool that starts at `min` threads and grows up to `max`.
    #[must_use]
    pub const fn bounded(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    /// Whether this pool configuration means inline execution.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.min < 0
    }
}

/// Error produced when [`CacheOptionsBuilder::build`] rejects a configuration.
#[derive(Debug, thiserror::Error)]
#[error("invalid cache configuration: {reason}")]
pub struct ConfigError {
    reason: String,
}

impl ConfigError {
    fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Typed cache configuration.
///
/// Constructed through [`CacheOptions::builder`]. The `set_*` methods adjust
/// tunables on a live cache; changes take effect at the next scheduling
/// decision that consults the field.
#[derive(Debug)]
pub struct CacheOptions {
    name: String,

    main_queue_cache_time_millis: AtomicU64,
    main_queue_cache_time_min_millis: AtomicU64,
    main_queue_max_target_size: AtomicUsize,
    max_cache_elements_hard_limit: AtomicUsize,
    return_queue_cache_time_min_millis: AtomicU64,
    return_queue_max_requeue_count: AtomicU32,
    untouched_item_cache_expiration_delay_millis: AtomicU64,
    max_updates_to_collect: AtomicUsize,
    can_merge_writes: AtomicBool,
    allow_data_reading_after_resync_failed_final: AtomicBool,
    allow_data_writing_after_resync_failed_final: AtomicBool,
    allow_updates_collection_for_multiple_full_cycles: AtomicBool,
    read_queue_batching_delay_millis: AtomicU64,
    write_queue_batching_delay_millis: AtomicU64,
    read_failure_max_retry_count: AtomicU32,
    write_failure_max_retry_count: AtomicU32,
    full_cache_cycle_failure_max_retry_count: AtomicU32,
    max_sleep_time_millis: AtomicU64,
    accept_out_of_order_reads: AtomicBool,
    log_throttle_time_interval_millis: AtomicU64,
    log_throttle_max_messages_of_type_per_time_interval: AtomicU32,
    event_notification_enabled: AtomicBool,
    max_cache_removed_retries: AtomicU32,
    initial_read_failed_final_action: AtomicU8,
    resync_failed_final_action: AtomicU8,
    resync_too_late_action: AtomicU8,

    // Fixed at construction: pools are built once at start, and histogram
    // buckets cannot be re-binned mid-flight.
    read_thread_pool_size: PoolSize,
    write_thread_pool_size: PoolSize,
    monitoring_full_cache_cycles_thresholds: [u32; 5],
    monitoring_time_since_access_thresholds: [Duration; 5],
}

impl CacheOptions {
    /// Creates a builder with defaults and the given cache name.
    ///
    /// The name identifies the cache in thread names and log messages.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> CacheOptionsBuilder {
        CacheOptionsBuilder::new(name)
    }

    /// Identifier used in thread names and logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target residency in the main queue.
    #[must_use]
    pub fn main_queue_cache_time(&self) -> Duration {
        Duration::from_millis(self.main_queue_cache_time_millis.load(Ordering::Relaxed))
    }

    /// Adjusts the main-queue target residency.
    pub fn set_main_queue_cache_time(&self, value: Duration) {
        self.main_queue_cache_time_millis.store(to_millis(value), Ordering::Relaxed);
    }

    /// Minimum main-queue residency; admission is refused when the remaining
    /// time budget (e.g. before a flush deadline) falls below this.
    #[must_use]
    pub fn main_queue_cache_time_min(&self) -> Duration {
        Duration::from_millis(self.main_queue_cache_time_min_millis.load(Ordering::Relaxed))
    }

    /// Soft target for the main-queue size; beyond it processing accelerates
    /// and the return queue stops retaining entries.
    #[must_use]
    pub fn main_queue_max_target_size(&self) -> usize {
        self.main_queue_max_target_size.load(Ordering::Relaxed)
    }

    /// Adjusts the main-queue soft size target.
    pub fn set_main_queue_max_target_size(&self, value: usize) {
        self.main_queue_max_target_size.store(value, Ordering::Relaxed);
    }

    /// Hard admission bound on resident entries.
    #[must_use]
    pub fn max_cache_elements_hard_limit(&self) -> usize {
        self.max_cache_elements_hard_limit.load(Ordering::Relaxed)
    }

    /// Adjusts the hard admission bound.
    pub fn set_max_cache_elements_hard_limit(&self, value: usize) {
        self.max_cache_elements_hard_limit.store(value, Ordering::Relaxed);
    }

    /// Target residency in the return queue.
    #[must_use]
    pub fn return_queue_cache_time_min(&self) -> Duration {
        Duration::from_millis(self.return_queue_cache_time_min_millis.load(Ordering::Relaxed))
    }

    /// Adjusts the return-queue residency.
    pub fn set_return_queue_cache_time_min(&self, value: Duration) {
        self.return_queue_cache_time_min_millis.store(to_millis(value), Ordering::Relaxed);
    }

    /// How many times a return-queue item is re-queued to let an outstanding
    /// write finish before eviction.
    #[must_use]
    pub fn return_queue_max_requeue_count(&self) -> u32 {
        self.return_queue_max_requeue_count.load(Ordering::Relaxed)
    }

    /// Minimum idle time before an entry is eligible for expiry at
    /// return-queue processing.
    #[must_use]
    pub fn untouched_item_cache_expiration_delay(&self) -> Duration {
        Duration::from_millis(self.untouched_item_cache_expiration_delay_millis.load(Ordering::Relaxed))
    }

    /// Adjusts the idle-expiry delay.
    pub fn set_untouched_item_cache_expiration_delay(&self, value: Duration) {
        self.untouched_item_cache_expiration_delay_millis
            .store(to_millis(value), Ordering::Relaxed);
    }

    /// Cap on the per-entry pending-update list.
    #[must_use]
    pub fn max_updates_to_collect(&self) -> usize {
        self.max_updates_to_collect.load(Ordering::Relaxed)
    }

    /// Adjusts the pending-update cap.
    pub fn set_max_updates_to_collect(&self, value: usize) {
        self.max_updates_to_collect.store(value, Ordering::Relaxed);
    }

    /// Whether a previously-failed write payload may be combined with the
    /// next write.
    #[must_use]
    pub fn can_merge_writes(&self) -> bool {
        self.can_merge_writes.load(Ordering::Relaxed)
    }

    /// Adjusts write merging.
    pub fn set_can_merge_writes(&self, value: bool) {
        self.can_merge_writes.store(value, Ordering::Relaxed);
    }

    /// Whether the stale value may still be served after a resync has failed
    /// permanently.
    #[must_use]
    pub fn allow_data_reading_after_resync_failed_final(&self) -> bool {
        self.allow_data_reading_after_resync_failed_final.load(Ordering::Relaxed)
    }

    /// Whether accumulated updates may still be written out after a resync
    /// has failed permanently.
    #[must_use]
    pub fn allow_data_writing_after_resync_failed_final(&self) -> bool {
        self.allow_data_writing_after_resync_failed_final.load(Ordering::Relaxed)
    }

    /// Whether updates keep being collected while an entry's cycles keep
    /// failing.
    #[must_use]
    pub fn allow_updates_collection_for_multiple_full_cycles(&self) -> bool {
        self.allow_updates_collection_for_multiple_full_cycles.load(Ordering::Relaxed)
    }

    /// Batching window of the read-queue worker; zero disables batching.
    #[must_use]
    pub fn read_queue_batching_delay(&self) -> Duration {
        Duration::from_millis(self.read_queue_batching_delay_millis.load(Ordering::Relaxed))
    }

    /// Batching window of the write-queue worker; zero disables batching.
    #[must_use]
    pub fn write_queue_batching_delay(&self) -> Duration {
        Duration::from_millis(self.write_queue_batching_delay_millis.load(Ordering::Relaxed))
    }

    /// Retry budget for storage reads (initial and resync alike).
    #[must_use]
    pub fn read_failure_max_retry_count(&self) -> u32 {
        self.read_failure_max_retry_count.load(Ordering::Relaxed)
    }

    /// Adjusts the read retry budget.
    pub fn set_read_failure_max_retry_count(&self, value: u32) {
        self.read_failure_max_retry_count.store(value, Ordering::Relaxed);
    }

    /// Retry budget for storage writes.
    #[must_use]
    pub fn write_failure_max_retry_count(&self) -> u32 {
        self.write_failure_max_retry_count.load(Ordering::Relaxed)
    }

    /// Adjusts the write retry budget.
    pub fn set_write_failure_max_retry_count(&self, value: u32) {
        self.write_failure_max_retry_count.store(value, Ordering::Relaxed);
    }

    /// Cycle-level retry budget; once exhausted, further cycle retries are
    /// suppressed regardless of the read/write budgets.
    #[must_use]
    pub fn full_cache_cycle_failure_max_retry_count(&self) -> u32 {
        self.full_cache_cycle_failure_max_retry_count.load(Ordering::Relaxed)
    }

    /// Longest uninterrupted block any worker thread may take.
    #[must_use]
    pub fn max_sleep_time(&self) -> Duration {
        Duration::from_millis(self.max_sleep_time_millis.load(Ordering::Relaxed))
    }

    /// Adjusts the worker sleep bound.
    pub fn set_max_sleep_time(&self, value: Duration) {
        self.max_sleep_time_millis.store(to_millis(value).max(1), Ordering::Relaxed);
    }

    /// Whether resync reads that arrive after the merge point are merged
    /// anyway.
    #[must_use]
    pub fn accept_out_of_order_reads(&self) -> bool {
        self.accept_out_of_order_reads.load(Ordering::Relaxed)
    }

    /// Sliding-window length for log throttling.
    #[must_use]
    pub fn log_throttle_time_interval(&self) -> Duration {
        Duration::from_millis(self.log_throttle_time_interval_millis.load(Ordering::Relaxed))
    }

    /// Messages of one `(classifier, severity)` allowed per window; zero
    /// disables throttling.
    #[must_use]
    pub fn log_throttle_max_messages_of_type_per_time_interval(&self) -> u32 {
        self.log_throttle_max_messages_of_type_per_time_interval.load(Ordering::Relaxed)
    }

    /// Whether internal events are dispatched to the event listener.
    #[must_use]
    pub fn event_notification_enabled(&self) -> bool {
        self.event_notification_enabled.load(Ordering::Relaxed)
    }

    /// How many removed-from-cache observations a client call rides out
    /// before failing.
    #[must_use]
    pub fn max_cache_removed_retries(&self) -> u32 {
        self.max_cache_removed_retries.load(Ordering::Relaxed)
    }

    /// Terminal policy for exhausted initial reads.
    #[must_use]
    pub fn initial_read_failed_final_action(&self) -> ReadFailedFinalAction {
        ReadFailedFinalAction::from_u8(self.initial_read_failed_final_action.load(Ordering::Relaxed))
    }

    /// Adjusts the initial-read terminal policy.
    pub fn set_initial_read_failed_final_action(&self, value: ReadFailedFinalAction) {
        self.initial_read_failed_final_action.store(value as u8, Ordering::Relaxed);
    }

    /// Terminal policy for exhausted resync reads.
    #[must_use]
    pub fn resync_failed_final_action(&self) -> ResyncFailedFinalAction {
        ResyncFailedFinalAction::from_u8(self.resync_failed_final_action.load(Ordering::Relaxed))
    }

    /// Adjusts the resync terminal policy.
    pub fn set_resync_failed_final_action(&self, value: ResyncFailedFinalAction) {
        self.resync_failed_final_action.store(value as u8, Ordering::Relaxed);
    }

    /// Policy for resync reads that arrive too late to merge.
    #[must_use]
    pub fn resync_too_late_action(&self) -> ResyncTooLateAction {
        ResyncTooLateAction::from_u8(self.resync_too_late_action.load(Ordering::Relaxed))
    }

    /// Read pool sizing; `(-1, -1)` means inline execution.
    #[must_use]
    pub fn read_thread_pool_size(&self) -> PoolSize {
        self.read_thread_pool_size
    }

    /// Write pool sizing; `(-1, -1)` means inline execution.
    #[must_use]
    pub fn write_thread_pool_size(&self) -> PoolSize {
        self.write_thread_pool_size
    }

    /// Ascending bucket thresholds for the full-cycles-in-cache histogram.
    #[must_use]
    pub fn monitoring_full_cache_cycles_thresholds(&self) -> [u32; 5] {
        self.monitoring_full_cache_cycles_thresholds
    }

    /// Ascending bucket thresholds for the time-since-last-access histogram.
    #[must_use]
    pub fn monitoring_time_since_access_thresholds(&self) -> [Duration; 5] {
        self.monitoring_time_since_access_thresholds
    }
}

/// Builder for [`CacheOptions`].
///
/// All setters take effect at [`build`](Self::build) time, which validates
/// cross-field constraints.
#[derive(Debug, Clone)]
pub struct CacheOptionsBuilder {
    name: String,
    main_queue_cache_time: Duration,
    main_queue_cache_time_min: Duration,
    main_queue_max_target_size: usize,
    max_cache_elements_hard_limit: usize,
    return_queue_cache_time_min: Duration,
    return_queue_max_requeue_count: u32,
    untouched_item_cache_expiration_delay: Duration,
    max_updates_to_collect: usize,
    can_merge_writes: bool,
    allow_data_reading_after_resync_failed_final: bool,
    allow_data_writing_after_resync_failed_final: bool,
    allow_updates_collection_for_multiple_full_cycles: bool,
    read_queue_batching_delay: Duration,
    write_queue_batching_delay: Duration,
    read_failure_max_retry_count: u32,
    write_failure_max_retry_count: u32,
    full_cache_cycle_failure_max_retry_count: u32,
    max_sleep_time: Duration,
    accept_out_of_order_reads: bool,
    log_throttle_time_interval: Duration,
    log_throttle_max_messages_of_type_per_time_interval: u32,
    event_notification_enabled: bool,
    max_cache_removed_retries: u32,
    initial_read_failed_final_action: ReadFailedFinalAction,
    resync_failed_final_action: ResyncFailedFinalAction,
    resync_too_late_action: ResyncTooLateAction,
    read_thread_pool_size: PoolSize,
    write_thread_pool_size: PoolSize,
    monitoring_full_cache_cycles_thresholds: [u32; 5],
    monitoring_time_since_access_thresholds: [Duration; 5],
}

impl CacheOptionsBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            main_queue_cache_time: Duration::from_secs(5),
            main_queue_cache_time_min: Duration::from_millis(500),
            main_queue_max_target_size: 10_000,
            max_cache_elements_hard_limit: 20_000,
            return_queue_cache_time_min: Duration::from_secs(1),
            return_queue_max_requeue_count: 6,
            untouched_item_cache_expiration_delay: Duration::from_secs(20),
            max_updates_to_collect: 512,
            can_merge_writes: false,
            allow_data_reading_after_resync_failed_final: true,
            allow_data_writing_after_resync_failed_final: true,
            allow_updates_collection_for_multiple_full_cycles: true,
            read_queue_batching_delay: Duration::ZERO,
            write_queue_batching_delay: Duration::ZERO,
            read_failure_max_retry_count: 3,
            write_failure_max_retry_count: 3,
            full_cache_cycle_failure_max_retry_count: 5,
            max_sleep_time: Duration::from_millis(100),
            accept_out_of_order_reads: false,
            log_throttle_time_interval: Duration::from_secs(10),
            log_throttle_max_messages_of_type_per_time_interval: 10,
            event_notification_enabled: false,
            max_cache_removed_retries: 3,
            initial_read_failed_final_action: ReadFailedFinalAction::KeepAndThrow,
            resync_failed_final_action: ResyncFailedFinalAction::KeepCollectingUpdates,
            resync_too_late_action: ResyncTooLateAction::Drop,
            read_thread_pool_size: PoolSize::disabled(),
            write_thread_pool_size: PoolSize::disabled(),
            monitoring_full_cache_cycles_thresholds: [1, 2, 3, 5, 10],
            monitoring_time_since_access_thresholds: [
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(30),
                Duration::from_secs(60),
                Duration::from_secs(300),
            ],
        }
    }

    /// Target residency in the main queue.
    #[must_use]
    pub fn main_queue_cache_time(mut self, value: Duration) -> Self {
        self.main_queue_cache_time = value;
        self
    }

    /// Minimum main-queue residency.
    #[must_use]
    pub fn main_queue_cache_time_min(mut self, value: Duration) -> Self {
        self.main_queue_cache_time_min = value;
        self
    }

    /// Soft target for the main-queue size.
    #[must_use]
    pub fn main_queue_max_target_size(mut self, value: usize) -> Self {
        self.main_queue_max_target_size = value;
        self
    }

    /// Hard admission bound on resident entries.
    #[must_use]
    pub fn max_cache_elements_hard_limit(mut self, value: usize) -> Self {
        self.max_cache_elements_hard_limit = value;
        self
    }

    /// Target residency in the return queue.
    #[must_use]
    pub fn return_queue_cache_time_min(mut self, value: Duration) -> Self {
        self.return_queue_cache_time_min = value;
        self
    }

    /// Re-queue budget for return-queue items with writes still pending.
    #[must_use]
    pub fn return_queue_max_requeue_count(mut self, value: u32) -> Self {
        self.return_queue_max_requeue_count = value;
        self
    }

    /// Minimum idle time before expiry eligibility.
    #[must_use]
    pub fn untouched_item_cache_expiration_delay(mut self, value: Duration) -> Self {
        self.untouched_item_cache_expiration_delay = value;
        self
    }

    /// Cap on the per-entry pending-update list.
    #[must_use]
    pub fn max_updates_to_collect(mut self, value: usize) -> Self {
        self.max_updates_to_collect = value;
        self
    }

    /// Whether failed-write payloads may merge with the next write.
    #[must_use]
    pub fn can_merge_writes(mut self, value: bool) -> Self {
        self.can_merge_writes = value;
        self
    }

    /// Whether stale values may be served after a permanent resync failure.
    #[must_use]
    pub fn allow_data_reading_after_resync_failed_final(mut self, value: bool) -> Self {
        self.allow_data_reading_after_resync_failed_final = value;
        self
    }

    /// Whether accumulated updates may be written after a permanent resync
    /// failure.
    #[must_use]
    pub fn allow_data_writing_after_resync_failed_final(mut self, value: bool) -> Self {
        self.allow_data_writing_after_resync_failed_final = value;
        self
    }

    /// Whether updates keep being collected across failing cycles.
    #[must_use]
    pub fn allow_updates_collection_for_multiple_full_cycles(mut self, value: bool) -> Self {
        self.allow_updates_collection_for_multiple_full_cycles = value;
        self
    }

    /// Read-queue batching window; zero disables batching.
    #[must_use]
    pub fn read_queue_batching_delay(mut self, value: Duration) -> Self {
        self.read_queue_batching_delay = value;
        self
    }

    /// Write-queue batching window; zero disables batching.
    #[must_use]
    pub fn write_queue_batching_delay(mut self, value: Duration) -> Self {
        self.write_queue_batching_delay = value;
        self
    }

    /// Retry budget for storage reads.
    #[must_use]
    pub fn read_failure_max_retry_count(mut self, value: u32) -> Self {
        self.read_failure_max_retry_count = value;
        self
    }

    /// Retry budget for storage writes.
    #[must_use]
    pub fn write_failure_max_retry_count(mut self, value: u32) -> Self {
        self.write_failure_max_retry_count = value;
        self
    }

    /// Cycle-level retry budget.
    #[must_use]
    pub fn full_cache_cycle_failure_max_retry_count(mut self, value: u32) -> Self {
        self.full_cache_cycle_failure_max_retry_count = value;
        self
    }

    /// Longest uninterrupted block any worker may take.
    #[must_use]
    pub fn max_sleep_time(mut self, value: Duration) -> Self {
        self.max_sleep_time = value;
        self
    }

    /// Whether late resync arrivals are merged.
    #[must_use]
    pub fn accept_out_of_order_reads(mut self, value: bool) -> Self {
        self.accept_out_of_order_reads = value;
        self
    }

    /// Sliding-window length for log throttling.
    #[must_use]
    pub fn log_throttle_time_interval(mut self, value: Duration) -> Self {
        self.log_throttle_time_interval = value;
        self
    }

    /// Messages allowed per `(classifier, severity)` window; zero disables
    /// throttling.
    #[must_use]
    pub fn log_throttle_max_messages_of_type_per_time_interval(mut self, value: u32) -> Self {
        self.log_throttle_max_messages_of_type_per_time_interval = value;
        self
    }

    /// Whether internal events are dispatched to the event listener.
    #[must_use]
    pub fn event_notification_enabled(mut self, value: bool) -> Self {
        self.event_notification_enabled = value;
        self
    }

    /// Removed-from-cache retry budget for client calls.
    #[must_use]
    pub fn max_cache_removed_retries(mut self, value: u32) -> Self {
        self.max_cache_removed_retries = value;
        self
    }

    /// Terminal policy for exhausted initial reads.
    #[must_use]
    pub fn initial_read_failed_final_action(mut self, value: ReadFailedFinalAction) -> Self {
        self.initial_read_failed_final_action = value;
        self
    }

    /// Terminal policy for exhausted resync reads.
    #[must_use]
    pub fn resync_failed_final_action(mut self, value: ResyncFailedFinalAction) -> Self {
        self.resync_failed_final_action = value;
        self
    }

    /// Policy for late resync arrivals.
    #[must_use]
    pub fn resync_too_late_action(mut self, value: ResyncTooLateAction) -> Self {
        self.resync_too_late_action = value;
        self
    }

    /// Read pool sizing.
    #[must_use]
    pub fn read_thread_pool_size(mut self, value: PoolSize) -> Self {
        self.read_thread_pool_size = value;
        self
    }

    /// Write pool sizing.
    #[must_use]
    pub fn write_thread_pool_size(mut self, value: PoolSize) -> Self {
        self.write_thread_pool_size = value;
        self
    }

    /// Bucket thresholds for the full-cycles histogram; must be ascending.
    #[must_use]
    pub fn monitoring_full_cache_cycles_thresholds(mut self, value: [u32; 5]) -> Self {
        self.monitoring_full_cache_cycles_thresholds = value;
        self
    }

    /// Bucket thresholds for the idle-time histogram; must be ascending.
    #[must_use]
    pub fn monitoring_time_since_access_thresholds(mut self, value: [Duration; 5]) -> Self {
        self.monitoring_time_since_access_thresholds = value;
        self
    }

    /// Validates the configuration and produces a [`CacheOptions`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a constraint is violated: empty name,
    /// zero sleep bound, non-ascending histogram thresholds, a main-queue
    /// residency below its minimum, a hard limit below the soft target, a
    /// zero update cap, or an invalid pool range.
    pub fn build(self) -> std::result::Result<CacheOptions, ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::new("cache name must not be empty"));
        }
        if self.max_sleep_time.is_zero() {
            return Err(ConfigError::new("max_sleep_time must be positive"));
        }
        if self.main_queue_cache_time < self.main_queue_cache_time_min {
            return Err(ConfigError::new(
                "main_queue_cache_time must be >= main_queue_cache_time_min",
            ));
        }
        if self.max_cache_elements_hard_limit < self.main_queue_max_target_size {
            return Err(ConfigError::new(
                "max_cache_elements_hard_limit must be >= main_queue_max_target_size",
            ));
        }
        if self.max_updates_to_collect == 0 {
            return Err(ConfigError::new("max_updates_to_collect must be positive"));
        }
        for pool in [self.read_thread_pool_size, self.write_thread_pool_size] {
            if !pool.is_disabled() && (pool.min < 1 || pool.max < pool.min) {
                return Err(ConfigError::new("thread pool size must be (-1, -1) or 1 <= min <= max"));
            }
        }
        if !self.monitoring_full_cache_cycles_thresholds.is_sorted_by(|a, b| a < b) {
            return Err(ConfigError::new(
                "monitoring_full_cache_cycles_thresholds must be strictly ascending",
            ));
        }
        if !self.monitoring_time_since_access_thresholds.is_sorted_by(|a, b| a < b) {
            return Err(ConfigError::new(
                "monitoring_time_since_access_thresholds must be strictly ascending",
            ));
        }

        Ok(CacheOptions {
            name: self.name,
            main_queue_cache_time_millis: AtomicU64::new(to_millis(self.main_queue_cache_time)),
            main_queue_cache_time_min_millis: AtomicU64::new(to_millis(self.main_queue_cache_time_min)),
            main_queue_max_target_size: AtomicUsize::new(self.main_queue_max_target_size),
            max_cache_elements_hard_limit: AtomicUsize::new(self.max_cache_elements_hard_limit),
            return_queue_cache_time_min_millis: AtomicU64::new(to_millis(self.return_queue_cache_time_min)),
            return_queue_max_requeue_count: AtomicU32::new(self.return_queue_max_requeue_count),
            untouched_item_cache_expiration_delay_millis: AtomicU64::new(to_millis(
                self.untouched_item_cache_expiration_delay,
            )),
            max_updates_to_collect: AtomicUsize::new(self.max_updates_to_collect),
            can_merge_writes: AtomicBool::new(self.can_merge_writes),
            allow_data_reading_after_resync_failed_final: AtomicBool::new(
                self.allow_data_reading_after_resync_failed_final,
            ),
            allow_data_writing_after_resync_failed_final: AtomicBool::new(
                self.allow_data_writing_after_resync_failed_final,
            ),
            allow_updates_collection_for_multiple_full_cycles: AtomicBool::new(
                self.allow_updates_collection_for_multiple_full_cycles,
            ),
            read_queue_batching_delay_millis: AtomicU64::new(to_millis(self.read_queue_batching_delay)),
            write_queue_batching_delay_millis: AtomicU64::new(to_millis(self.write_queue_batching_delay)),
            read_failure_max_retry_count: AtomicU32::new(self.read_failure_max_retry_count),
            write_failure_max_retry_count: AtomicU32::new(self.write_failure_max_retry_count),
            full_cache_cycle_failure_max_retry_count: AtomicU32::new(self.full_cache_cycle_failure_max_retry_count),
            max_sleep_time_millis: AtomicU64::new(to_millis(self.max_sleep_time).max(1)),
            accept_out_of_order_reads: AtomicBool::new(self.accept_out_of_order_reads),
            log_throttle_time_interval_millis: AtomicU64::new(to_millis(self.log_throttle_time_interval)),
            log_throttle_max_messages_of_type_per_time_interval: AtomicU32::new(
                self.log_throttle_max_messages_of_type_per_time_interval,
            ),
            event_notification_enabled: AtomicBool::new(self.event_notification_enabled),
            max_cache_removed_retries: AtomicU32::new(self.max_cache_removed_retries),
            initial_read_failed_final_action: AtomicU8::new(self.initial_read_failed_final_action as u8),
            resync_failed_final_action: AtomicU8::new(self.resync_failed_final_action as u8),
            resync_too_late_action: AtomicU8::new(self.resync_too_late_action as u8),
            read_thread_pool_size: self.read_thread_pool_size,
            write_thread_pool_size: self.write_thread_pool_size,
            monitoring_full_cache_cycles_thresholds: self.monitoring_full_cache_cycles_thresholds,
            monitoring_time_since_access_thresholds: self.monitoring_time_since_access_thresholds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let options = CacheOptions::builder("test").build().unwrap();
        assert_eq!(options.name(), "test");
        assert_eq!(options.main_queue_cache_time(), Duration::from_secs(5));
        assert!(options.read_thread_pool_size().is_disabled());
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(CacheOptions::builder("").build().is_err());
    }

    #[test]
    fn residency_below_minimum_is_rejected() {
        let result = CacheOptions::builder("test")
            .main_queue_cache_time(Duration::from_millis(100))
            .main_queue_cache_time_min(Duration::from_millis(200))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn unsorted_thresholds_are_rejected() {
        let result = CacheOptions::builder("test")
            .monitoring_full_cache_cycles_thresholds([5, 4, 3, 2, 1])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn invalid_pool_range_is_rejected() {
        let result = CacheOptions::builder("test")
            .read_thread_pool_size(PoolSize::bounded(4, 2))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn runtime_setters_are_visible() {
        let options = CacheOptions::builder("test").build().unwrap();

        options.set_max_updates_to_collect(7);
        assert_eq!(options.max_updates_to_collect(), 7);

        options.set_can_merge_writes(true);
        assert!(options.can_merge_writes());

        options.set_resync_failed_final_action(ResyncFailedFinalAction::StopCollectingUpdates);
        assert_eq!(
            options.resync_failed_final_action(),
            ResyncFailedFinalAction::StopCollectingUpdates
        );
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Pipeline counters, histograms, and last-message tracking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::to_millis;
use crate::message::{SEVERITY_COUNT, Severity};

/// Counter totals for every pipeline stage.
///
/// Workers bump these with relaxed atomics; the status snapshot copies them
/// out. Individual counters are monotonically non-decreasing but are not
/// updated atomically as a group.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub cache_read_attempts: AtomicU64,
    pub cache_read_successes: AtomicU64,
    pub cache_read_timeouts: AtomicU64,
    pub cache_preload_attempts: AtomicU64,
    pub cache_write_attempts: AtomicU64,
    pub cache_write_successes: AtomicU64,
    pub cache_write_too_many_updates: AtomicU64,
    pub cache_write_rejected: AtomicU64,

    pub storage_read_attempts: AtomicU64,
    pub storage_read_successes: AtomicU64,
    pub storage_read_failures: AtomicU64,
    pub storage_read_retries: AtomicU64,
    pub storage_read_initial_attempts: AtomicU64,
    pub storage_read_initial_successes: AtomicU64,
    pub storage_read_initial_failed_final: AtomicU64,
    pub storage_read_refresh_attempts: AtomicU64,
    pub storage_read_refresh_successes: AtomicU64,
    pub storage_read_refresh_failed_final: AtomicU64,
    pub storage_read_refresh_too_late: AtomicU64,
    pub storage_read_merge_do_nothing: AtomicU64,

    pub storage_write_attempts: AtomicU64,
    pub storage_write_successes: AtomicU64,
    pub storage_write_failures: AtomicU64,
    pub storage_write_retries: AtomicU64,
    pub storage_write_failed_final: AtomicU64,
    pub storage_write_data_lost: AtomicU64,

    pub main_queue_processed: AtomicU64,
    pub main_queue_requeues: AtomicU64,
    pub main_queue_removed_unrecoverable: AtomicU64,
    pub full_cycle_failures: AtomicU64,

    pub return_queue_processed: AtomicU64,
    pub return_queue_retained: AtomicU64,
    pub return_queue_requeues: AtomicU64,
    pub return_queue_expired_from_cache: AtomicU64,
    pub return_queue_removed_from_cache: AtomicU64,
    pub return_queue_item_not_retained_due_to_main_queue_size: AtomicU64,
    pub return_queue_negative_time_since_last_access_errors: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Per-severity last-message record.
///
/// Timestamps are updated for every offered message, logged or not; texts
/// are updated only when the message was actually emitted. The two are not
/// required to be mutually consistent.
#[derive(Debug)]
pub(crate) struct LastMessages {
    timestamps: [AtomicU64; SEVERITY_COUNT],
    texts: Mutex<[Option<String>; SEVERITY_COUNT]>,
}

impl Default for LastMessages {
    fn default() -> Self {
        Self {
            timestamps: std::array::from_fn(|_| AtomicU64::new(0)),
            texts: Mutex::new(std::array::from_fn(|_| None)),
        }
    }
}

impl LastMessages {
    /// Records that a message of this severity was offered at `now_millis`.
    ///
    /// Timestamps are stored as `now_millis + 1` so that zero can mean
    /// "never"; the snapshot undoes the shift.
    pub fn record_offered(&self, severity: Severity, now_millis: u64) {
        self.timestamps[severity.ordinal()].store(now_millis.saturating_add(1), Ordering::Relaxed);
    }

    /// Records the text of a message that was actually emitted.
    pub fn record_logged(&self, severity: Severity, text: String) {
        self.texts.lock()[severity.ordinal()] = Some(text);
    }

    fn snapshot(&self) -> ([Option<u64>; SEVERITY_COUNT], [Option<String>; SEVERITY_COUNT]) {
        let timestamps = std::array::from_fn(|i| {
            let raw = self.timestamps[i].load(Ordering::Relaxed);
            (raw > 0).then(|| raw - 1)
        });
        (timestamps, self.texts.lock().clone())
    }
}

/// Shared monitoring state for one cache instance.
#[derive(Debug, Default)]
pub(crate) struct Monitor {
    pub counters: Counters,
    pub last_messages: LastMessages,
    full_cycle_buckets: [AtomicU64; 6],
    time_since_access_buckets: [AtomicU64; 6],
}

impl Monitor {
    /// Buckets a full-cycle count against the five configured thresholds.
    ///
    /// Bucket `i` counts observations below `thresholds[i]`; the sixth
    /// bucket counts everything at or above the last threshold.
    pub fn record_full_cycles(&self, cycles: u64, thresholds: [u32; 5]) {
        let index = thresholds
            .iter()
            .position(|t| cycles < u64::from(*t))
            .unwrap_or(thresholds.len());
        bump(&self.full_cycle_buckets[index]);
    }

    /// Buckets an idle duration against the five configured thresholds.
    pub fn record_time_since_access(&self, idle_millis: u64, thresholds: [Duration; 5]) {
        let index = thresholds
            .iter()
            .position(|t| idle_millis < to_millis(*t))
            .unwrap_or(thresholds.len());
        bump(&self.time_since_access_buckets[index]);
    }

    pub fn bucket_snapshot(&self) -> ([u64; 6], [u64; 6]) {
        (
            std::array::from_fn(|i| self.full_cycle_buckets[i].load(Ordering::Relaxed)),
            std::array::from_fn(|i| self.time_since_access_buckets[i].load(Ordering::Relaxed)),
        )
    }

    pub fn message_snapshot(&self) -> ([Option<u64>; SEVERITY_COUNT], [Option<String>; SEVERITY_COUNT]) {
        self.last_messages.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let monitor = Monitor::default();
        assert_eq!(monitor.counters.storage_read_attempts.load(Ordering::Relaxed), 0);
    }

    #[rstest::rstest]
    #[case(0, 0)]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(4, 3)]
    #[case(7, 4)]
    #[case(10, 5)]
    #[case(100, 5)]
    fn full_cycle_bucketing_uses_thresholds(#[case] cycles: u64, #[case] expected_bucket: usize) {
        let monitor = Monitor::default();
        monitor.record_full_cycles(cycles, [1, 2, 3, 5, 10]);

        let (buckets, _) = monitor.bucket_snapshot();
        let mut expected = [0u64; 6];
        expected[expected_bucket] = 1;
        assert_eq!(buckets, expected);
    }

    #[test]
    fn idle_bucketing_uses_thresholds() {
        let monitor = Monitor::default();
        let thresholds = [
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(30),
            Duration::from_millis(40),
            Duration::from_millis(50),
        ];

        monitor.record_time_since_access(5, thresholds);
        monitor.record_time_since_access(45, thresholds);
        monitor.record_time_since_access(5_000, thresholds);

        let (_, idle) = monitor.bucket_snapshot();
        assert_eq!(idle, [1, 0, 0, 0, 1, 1]);
    }

    #[test]
    fn offered_timestamp_is_tracked_without_text() {
        let monitor = Monitor::default();
        monitor.last_messages.record_offered(Severity::Warn, 42);

        let (timestamps, texts) = monitor.message_snapshot();
        assert_eq!(timestamps[Severity::Warn.ordinal()], Some(42));
        assert_eq!(texts[Severity::Warn.ordinal()], None);
    }

    #[test]
    fn zero_timestamp_roundtrips_as_never() {
        let monitor = Monitor::default();
        monitor.last_messages.record_offered(Severity::Error, 0);

        let (timestamps, _) = monitor.message_snapshot();
        assert_eq!(timestamps[Severity::Error.ordinal()], Some(0));
        assert_eq!(timestamps[Severity::Fatal.ordinal()], None);
    }
}

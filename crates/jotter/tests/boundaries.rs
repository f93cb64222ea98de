// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Boundary behaviors: update caps, admission limits, failure policies.

use std::time::Duration;

use jotter::testing::CharSeqBacking;
use jotter::{CacheError, CacheOptions, ReadFailedFinalAction, WriteBehindCache};
use pretty_assertions::assert_eq;

fn parked_options(name: &str) -> CacheOptions {
    CacheOptions::builder(name)
        .main_queue_cache_time(Duration::from_secs(60))
        .main_queue_cache_time_min(Duration::from_millis(10))
        .return_queue_cache_time_min(Duration::from_millis(50))
        .max_sleep_time(Duration::from_millis(10))
        .build()
        .expect("valid options")
}

#[test]
fn update_cap_rejects_exactly_the_excess_write() {
    let options = CacheOptions::builder("update-cap")
        .main_queue_cache_time(Duration::from_secs(60))
        .main_queue_cache_time_min(Duration::from_millis(10))
        .return_queue_cache_time_min(Duration::from_millis(50))
        .max_sleep_time(Duration::from_millis(10))
        .max_updates_to_collect(3)
        .build()
        .expect("valid options");
    let cache = WriteBehindCache::new(CharSeqBacking::new(), options);
    cache.start().expect("start");

    let key = "capped".to_owned();
    cache.read_for(&key, Duration::from_millis(500)).expect("read");

    for update in ['a', 'b', 'c'] {
        assert_eq!(cache.write_if_cached(&key, update).expect("write"), Some(true));
    }
    assert!(matches!(
        cache.write_if_cached(&key, 'd'),
        Err(CacheError::TooManyUpdates { limit: 3 })
    ));

    let status = cache.status(Duration::ZERO);
    assert_eq!(status.cache_write_too_many_updates, 1);
    assert_eq!(status.cache_write_successes, 3);

    // The cached view reflects only the accepted updates.
    let value = cache.read_if_cached(&key).expect("read");
    assert_eq!(value.as_deref(), Some("abc"));

    cache.shutdown_for(Duration::from_secs(3)).expect("shutdown");
}

#[test]
fn hard_limit_denies_admission() {
    let options = CacheOptions::builder("hard-limit")
        .main_queue_cache_time(Duration::from_secs(60))
        .main_queue_cache_time_min(Duration::from_millis(10))
        .return_queue_cache_time_min(Duration::from_millis(50))
        .max_sleep_time(Duration::from_millis(10))
        .main_queue_max_target_size(2)
        .max_cache_elements_hard_limit(2)
        .build()
        .expect("valid options");
    let cache = WriteBehindCache::new(CharSeqBacking::new(), options);
    cache.start().expect("start");

    cache.preload(&"k1".to_owned()).expect("preload");
    cache.preload(&"k2".to_owned()).expect("preload");
    assert!(matches!(
        cache.preload(&"k3".to_owned()),
        Err(CacheError::CacheFull { limit: 2 })
    ));
    assert!(cache.current_size() <= 2);

    // Preloading a resident key is not a new admission.
    cache.preload(&"k1".to_owned()).expect("preload");

    cache.shutdown_for(Duration::from_secs(3)).expect("shutdown");
}

#[test]
fn storage_read_longer_than_max_sleep_still_completes() {
    // max_sleep_time bounds internal waits, not storage calls.
    let backing = CharSeqBacking::configured("", Duration::from_millis(300), Duration::ZERO);
    let cache = WriteBehindCache::new(backing, parked_options("slow-read"));
    cache.start().expect("start");

    let value = cache
        .read_for(&"slow".to_owned(), Duration::from_secs(2))
        .expect("read");
    assert_eq!(value.as_deref(), Some(""));

    cache.shutdown_for(Duration::from_secs(3)).expect("shutdown");
}

#[test]
fn read_timeout_returns_empty_and_counts() {
    let backing = CharSeqBacking::configured("", Duration::from_millis(500), Duration::ZERO);
    let cache = WriteBehindCache::new(backing, parked_options("timeout"));
    cache.start().expect("start");

    let value = cache
        .read_for(&"slow".to_owned(), Duration::from_millis(50))
        .expect("read");
    assert_eq!(value, None);
    assert!(matches!(
        cache.try_read_for(&"slow2".to_owned(), Duration::from_millis(1)),
        Err(CacheError::Timeout)
    ));

    let status = cache.status(Duration::ZERO);
    assert_eq!(status.cache_read_timeouts, 2);

    cache.shutdown_for(Duration::from_secs(3)).expect("shutdown");
}

#[test]
fn write_before_load_reports_not_yet_loaded() {
    let backing = CharSeqBacking::configured("", Duration::from_millis(500), Duration::ZERO);
    let cache = WriteBehindCache::new(backing, parked_options("unloaded"));
    cache.start().expect("start");

    let key = "pending".to_owned();
    cache.preload(&key).expect("preload");
    assert!(matches!(cache.write_if_cached(&key, 'x'), Err(CacheError::NotYetLoaded)));

    // An entirely absent key is empty, not an error.
    assert_eq!(cache.write_if_cached(&"absent".to_owned(), 'x').expect("write"), None);

    cache.shutdown_for(Duration::from_secs(3)).expect("shutdown");
}

#[test]
fn exhausted_initial_read_keep_and_throw() {
    let backing = CharSeqBacking::new();
    backing.script_failures(7, 1.0, 0.0, None);

    let options = CacheOptions::builder("keep-and-throw")
        .main_queue_cache_time(Duration::from_secs(60))
        .main_queue_cache_time_min(Duration::from_millis(10))
        .return_queue_cache_time_min(Duration::from_millis(50))
        .max_sleep_time(Duration::from_millis(10))
        .read_failure_max_retry_count(2)
        .initial_read_failed_final_action(ReadFailedFinalAction::KeepAndThrow)
        .build()
        .expect("valid options");
    let cache = WriteBehindCache::new(backing, options);
    cache.start().expect("start");

    let key = "doomed".to_owned();
    let result = cache.read_for(&key, Duration::from_secs(2));
    assert!(matches!(result, Err(CacheError::FailedToLoad { .. })), "got {result:?}");

    // The terminal entry keeps rejecting reads and writes.
    assert!(matches!(cache.read_if_cached(&key), Err(CacheError::FailedToLoad { .. })));
    assert!(matches!(cache.write_if_cached(&key, 'x'), Err(CacheError::FailedToLoad { .. })));

    let status = cache.status(Duration::ZERO);
    assert_eq!(status.storage_read_initial_failed_final, 1);
    // One initial attempt plus two retries.
    assert_eq!(status.storage_read_attempts, 3);
    assert_eq!(status.storage_read_retries, 2);

    cache.shutdown_for(Duration::from_secs(3)).expect("shutdown");
}

#[test]
fn exhausted_initial_read_remove_exhausts_client_retries() {
    let backing = CharSeqBacking::new();
    backing.script_failures(7, 1.0, 0.0, None);

    let options = CacheOptions::builder("remove-on-fail")
        .main_queue_cache_time(Duration::from_secs(60))
        .main_queue_cache_time_min(Duration::from_millis(10))
        .return_queue_cache_time_min(Duration::from_millis(50))
        .max_sleep_time(Duration::from_millis(10))
        .read_failure_max_retry_count(1)
        .max_cache_removed_retries(2)
        .initial_read_failed_final_action(ReadFailedFinalAction::RemoveFromCache)
        .build()
        .expect("valid options");
    let cache = WriteBehindCache::new(backing, options);
    cache.start().expect("start");

    let result = cache.read_for(&"gone".to_owned(), Duration::from_secs(5));
    assert!(
        matches!(result, Err(CacheError::RemovedFromCacheRetryExhausted { attempts: 3 })),
        "got {result:?}"
    );

    cache.shutdown_for(Duration::from_secs(3)).expect("shutdown");
}

#[test]
fn non_standard_messages_reach_monitoring() {
    let cache = WriteBehindCache::new(CharSeqBacking::new(), parked_options("messages"));
    cache.start().expect("start");

    cache.log_non_standard_message(jotter::Severity::ExternalWarn, "OPERATOR", "disk almost full");

    let status = cache.status(Duration::ZERO);
    let ordinal = jotter::Severity::ExternalWarn.ordinal();
    assert!(status.last_message_timestamps[ordinal].is_some());
    assert_eq!(
        status.last_logged_message_texts[ordinal].as_deref(),
        Some("disk almost full")
    );
    assert_eq!(status.last_warn_text.as_deref(), Some("disk almost full"));

    cache.shutdown_for(Duration::from_secs(3)).expect("shutdown");
}

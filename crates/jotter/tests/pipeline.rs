// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Pipeline behavior: resync composition, failure handling, data retention.

use std::time::{Duration, Instant};

use jotter::testing::CharSeqBacking;
use jotter::{CacheOptions, WriteBehindCache};
use pretty_assertions::assert_eq;

fn cycling_options(name: &str) -> CacheOptions {
    CacheOptions::builder(name)
        .main_queue_cache_time(Duration::from_millis(100))
        .main_queue_cache_time_min(Duration::from_millis(10))
        .return_queue_cache_time_min(Duration::from_millis(30))
        .untouched_item_cache_expiration_delay(Duration::from_secs(60))
        .max_sleep_time(Duration::from_millis(5))
        .build()
        .expect("valid options")
}

/// Polls until `check` passes or the timeout expires.
fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    check()
}

#[test]
fn resync_composes_with_backing_marker() {
    // The backing appends "###" on every write; after one cycle each key's
    // storage value is the marker followed by the single update.
    let backing = CharSeqBacking::configured("###", Duration::ZERO, Duration::ZERO);
    let cache = WriteBehindCache::new(backing.clone(), cycling_options("resync"));
    cache.start().expect("start");

    let keys: Vec<String> = (0..50).map(|i| format!("key-{i}")).collect();
    for key in &keys {
        cache.read_for(key, Duration::from_millis(500)).expect("read");
        assert_eq!(cache.write_if_cached(key, 'u').expect("write"), Some(true));
    }

    let all_written = wait_for(Duration::from_secs(5), || {
        keys.iter().all(|key| backing.get(key).is_some_and(|v| v == "###u"))
    });
    assert!(all_written, "storage: {:?}", backing.snapshot());

    // The cached view reconciles to the storage value through the resync.
    let reconciled = wait_for(Duration::from_secs(5), || {
        cache
            .read_if_cached(&keys[0])
            .expect("read")
            .is_some_and(|v| v == "###u")
    });
    assert!(reconciled);

    cache.shutdown_for(Duration::from_secs(5)).expect("shutdown");
}

#[test]
fn updates_across_cycles_interleave_with_markers() {
    let backing = CharSeqBacking::configured("###", Duration::ZERO, Duration::ZERO);
    let cache = WriteBehindCache::new(backing.clone(), cycling_options("interleave"));
    cache.start().expect("start");

    let key = "multi".to_owned();
    // Each flush forces a full cycle, so every update lands in its own write.
    for update in ['a', 'b', 'c'] {
        cache.read_for(&key, Duration::from_millis(500)).expect("read");
        assert_eq!(cache.write_if_cached(&key, update).expect("write"), Some(true));
        assert!(cache.flush_for(Duration::from_secs(2)).expect("flush"));
    }

    assert_eq!(backing.get("multi"), Some("###a###b###c".to_owned()));
    cache.shutdown_for(Duration::from_secs(5)).expect("shutdown");
}

#[test]
fn scripted_failures_lose_no_update_characters() {
    // Reads and writes fail half the time, but never often enough in a row
    // to exhaust a retry budget; with write merging enabled every accepted
    // update character must reach storage.
    let backing = CharSeqBacking::new();
    backing.script_failures(42, 0.5, 0.5, Some(2));

    let options = CacheOptions::builder("flaky")
        .main_queue_cache_time(Duration::from_millis(80))
        .main_queue_cache_time_min(Duration::from_millis(10))
        .return_queue_cache_time_min(Duration::from_millis(30))
        .untouched_item_cache_expiration_delay(Duration::from_secs(60))
        .max_sleep_time(Duration::from_millis(5))
        .read_failure_max_retry_count(3)
        .write_failure_max_retry_count(3)
        .full_cache_cycle_failure_max_retry_count(100)
        .can_merge_writes(true)
        .build()
        .expect("valid options");
    let cache = WriteBehindCache::new(backing.clone(), options);
    cache.start().expect("start");

    let keys: Vec<String> = (0..5).map(|i| format!("flaky-{i}")).collect();
    let updates = "abcdef";
    for key in &keys {
        cache.try_read_for(key, Duration::from_secs(2)).expect("load");
    }
    for update in updates.chars() {
        for key in &keys {
            assert_eq!(cache.write_if_cached(key, update).expect("write"), Some(true));
        }
        std::thread::sleep(Duration::from_millis(40));
    }

    assert!(cache.shutdown_for(Duration::from_secs(10)).expect("shutdown"));

    // Order within a key is not constrained, but the multiset of characters
    // must match what was submitted.
    let mut expected: Vec<char> = updates.chars().collect();
    expected.sort_unstable();
    for key in &keys {
        let stored = backing.get(key).unwrap_or_default();
        let mut actual: Vec<char> = stored.chars().collect();
        actual.sort_unstable();
        assert_eq!(actual, expected, "key {key} stored {stored:?}");
    }
}

#[test]
fn storage_round_trip_across_cache_instances() {
    let backing = CharSeqBacking::new();

    {
        let cache = WriteBehindCache::new(backing.clone(), cycling_options("writer"));
        cache.start().expect("start");
        let key = "round-trip".to_owned();
        cache.read_for(&key, Duration::from_millis(500)).expect("read");
        for update in "abc".chars() {
            cache.write_if_cached(&key, update).expect("write");
        }
        assert!(cache.shutdown_for(Duration::from_secs(5)).expect("shutdown"));
    }

    assert_eq!(backing.get("round-trip"), Some("abc".to_owned()));

    // A fresh cache over the same storage reads the composition back.
    let cache = WriteBehindCache::new(backing.clone(), cycling_options("reader"));
    cache.start().expect("start");
    let value = cache
        .read_for(&"round-trip".to_owned(), Duration::from_millis(500))
        .expect("read");
    assert_eq!(value.as_deref(), Some("abc"));
    cache.shutdown_for(Duration::from_secs(5)).expect("shutdown");
}

#[test]
fn retained_entries_keep_cycling() {
    let backing = CharSeqBacking::new();
    let cache = WriteBehindCache::new(backing.clone(), cycling_options("retained"));
    cache.start().expect("start");

    let key = "busy".to_owned();
    cache.read_for(&key, Duration::from_millis(500)).expect("read");

    // Touch the entry continuously across several cycles.
    for update in "xyz".chars() {
        cache.write_if_cached(&key, update).expect("write");
        std::thread::sleep(Duration::from_millis(150));
    }

    let written = wait_for(Duration::from_secs(5), || {
        backing.get("busy").is_some_and(|v| v.len() == 3)
    });
    assert!(written, "storage: {:?}", backing.snapshot());

    let status = cache.status(Duration::ZERO);
    assert!(status.return_queue_retained >= 1, "entry should have been retained");
    assert!(status.storage_read_refresh_attempts >= 1, "resyncs should have run");

    cache.shutdown_for(Duration::from_secs(5)).expect("shutdown");
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Test doubles for exercising the cache against scripted storage.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::adapter::CacheAdapter;
use crate::error::BoxError;

/// An in-memory character-sequence backing.
///
/// Models the cache payload as a string of characters: updates are single
/// characters appended to the value, write payloads are the concatenation of
/// the collected characters, and a storage write appends an optional marker
/// followed by the payload to the stored value. This makes every ordering
/// and merge property directly visible in the final string.
///
/// Failure injection and latency are scripted per backing instance; clones
/// share the same underlying storage, so a test can keep a handle for
/// inspection while the cache owns another.
///
/// # Examples
///
/// ```
/// use jotter::testing::CharSeqBacking;
/// use jotter::CacheAdapter;
///
/// let backing = CharSeqBacking::new();
/// backing.put("k", "ab");
///
/// assert_eq!(backing.read(&"k".to_owned()).unwrap(), "ab");
/// backing.write(&"k".to_owned(), &"cd".to_owned()).unwrap();
/// assert_eq!(backing.get("k"), Some("abcd".to_owned()));
/// ```
#[derive(Debug, Clone)]
pub struct CharSeqBacking {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    storage: Mutex<HashMap<String, String>>,
    write_marker: String,
    read_delay: Duration,
    write_delay: Duration,
    failures: Mutex<FailureScript>,
}

#[derive(Debug, Default)]
struct FailureScript {
    rng: fastrand::Rng,
    read_failure_rate: f64,
    write_failure_rate: f64,
    /// Per-key cap on consecutive failures; `None` means unbounded.
    max_consecutive_failures: Option<u32>,
    consecutive_read_failures: HashMap<String, u32>,
    consecutive_write_failures: HashMap<String, u32>,
}

impl FailureScript {
    fn should_fail_read(&mut self, key: &str) -> bool {
        Self::should_fail(
            &mut self.rng,
            self.read_failure_rate,
            self.max_consecutive_failures,
            self.consecutive_read_failures.entry(key.to_owned()).or_default(),
        )
    }

    fn should_fail_write(&mut self, key: &str) -> bool {
        Self::should_fail(
            &mut self.rng,
            self.write_failure_rate,
            self.max_consecutive_failures,
            self.consecutive_write_failures.entry(key.to_owned()).or_default(),
        )
    }

    fn should_fail(rng: &mut fastrand::Rng, rate: f64, cap: Option<u32>, consecutive: &mut u32) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if let Some(cap) = cap
            && *consecutive >= cap
        {
            *consecutive = 0;
            return false;
        }
        if rng.f64() < rate {
            *consecutive += 1;
            true
        } else {
            *consecutive = 0;
            false
        }
    }
}

impl Default for CharSeqBacking {
    fn default() -> Self {
        Self::new()
    }
}

impl CharSeqBacking {
    /// Creates an empty backing with no marker, no latency, and no failures.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                storage: Mutex::new(HashMap::new()),
                write_marker: String::new(),
                read_delay: Duration::ZERO,
                write_delay: Duration::ZERO,
                failures: Mutex::new(FailureScript::default()),
            }),
        }
    }

    /// Builder-style constructor with every knob exposed.
    #[must_use]
    pub fn configured(
        write_marker: impl Into<String>,
        read_delay: Duration,
        write_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage: Mutex::new(HashMap::new()),
                write_marker: write_marker.into(),
                read_delay,
                write_delay,
                failures: Mutex::new(FailureScript::default()),
            }),
        }
    }

    /// Scripts storage failures: each read/write fails with the given
    /// probability, never more than `max_consecutive` times in a row per key.
    pub fn script_failures(
        &self,
        seed: u64,
        read_failure_rate: f64,
        write_failure_rate: f64,
        max_consecutive: Option<u32>,
    ) {
        let mut failures = self.inner.failures.lock();
        failures.rng = fastrand::Rng::with_seed(seed);
        failures.read_failure_rate = read_failure_rate;
        failures.write_failure_rate = write_failure_rate;
        failures.max_consecutive_failures = max_consecutive;
    }

    /// Seeds a stored value directly.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.storage.lock().insert(key.into(), value.into());
    }

    /// Reads a stored value directly, bypassing delays and failure scripts.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.storage.lock().get(key).cloned()
    }

    /// Copies the full storage map out for assertions.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.inner.storage.lock().clone()
    }

    /// Number of keys in storage.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.storage.lock().len()
    }

    /// Whether storage holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.storage.lock().is_empty()
    }
}

impl CacheAdapter for CharSeqBacking {
    type Key = String;
    type Value = String;
    type Update = char;
    type Payload = String;

    fn read(&self, key: &String) -> Result<String, BoxError> {
        if !self.inner.read_delay.is_zero() {
            std::thread::sleep(self.inner.read_delay);
        }
        if self.inner.failures.lock().should_fail_read(key) {
            return Err(format!("scripted read failure for {key}").into());
        }
        // Missing keys read as the empty sequence.
        Ok(self.inner.storage.lock().get(key).cloned().unwrap_or_default())
    }

    fn write(&self, key: &String, payload: &String) -> Result<(), BoxError> {
        if !self.inner.write_delay.is_zero() {
            std::thread::sleep(self.inner.write_delay);
        }
        if self.inner.failures.lock().should_fail_write(key) {
            return Err(format!("scripted write failure for {key}").into());
        }
        let mut storage = self.inner.storage.lock();
        let slot = storage.entry(key.clone()).or_default();
        slot.push_str(&self.inner.write_marker);
        slot.push_str(payload);
        Ok(())
    }

    fn apply_update(&self, value: &mut String, update: &char) {
        value.push(*update);
    }

    fn collect_payload(&self, updates: &[char]) -> String {
        updates.iter().collect()
    }

    fn merge_payloads(&self, earlier: &String, later: &String) -> String {
        let mut merged = earlier.clone();
        merged.push_str(later);
        merged
    }

    fn resync_merge(&self, fresh: String, pending: &[char]) -> String {
        let mut merged = fresh;
        merged.extend(pending.iter());
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_reads_as_empty() {
        let backing = CharSeqBacking::new();
        assert_eq!(backing.read(&"nope".to_owned()).unwrap(), "");
    }

    #[test]
    fn write_appends_marker_then_payload() {
        let backing = CharSeqBacking::configured("###", Duration::ZERO, Duration::ZERO);
        backing.write(&"k".to_owned(), &"ab".to_owned()).unwrap();
        backing.write(&"k".to_owned(), &"cd".to_owned()).unwrap();

        assert_eq!(backing.get("k"), Some("###ab###cd".to_owned()));
    }

    #[test]
    fn clones_share_storage() {
        let backing = CharSeqBacking::new();
        let clone = backing.clone();
        backing.put("k", "v");

        assert_eq!(clone.get("k"), Some("v".to_owned()));
    }

    #[test]
    fn scripted_failures_respect_consecutive_cap() {
        let backing = CharSeqBacking::new();
        backing.script_failures(7, 1.0, 0.0, Some(2));

        let key = "k".to_owned();
        assert!(backing.read(&key).is_err());
        assert!(backing.read(&key).is_err());
        // The cap forces the third attempt through even at rate 1.0.
        assert!(backing.read(&key).is_ok());
    }

    #[test]
    fn resync_merge_replays_pending_updates() {
        let backing = CharSeqBacking::new();
        let merged = backing.resync_merge("###a".to_owned(), &['b', 'c']);
        assert_eq!(merged, "###abc");
    }

    #[test]
    fn collect_payload_preserves_order() {
        let backing = CharSeqBacking::new();
        assert_eq!(backing.collect_payload(&['x', 'y', 'z']), "xyz");
    }
}

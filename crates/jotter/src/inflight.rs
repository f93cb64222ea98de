// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The authoritative key→entry mapping for resident entries.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;

use crate::adapter::CacheAdapter;
use crate::entry::Entry;

/// Outcome of [`InflightMap::lookup_or_create`].
pub(crate) enum Lookup<A: CacheAdapter> {
    /// The key was already resident.
    Existing(Arc<Entry<A>>),
    /// A fresh entry was allocated; the caller must enqueue its initial read.
    Created(Arc<Entry<A>>),
    /// Admission denied: the cache is at its hard element limit.
    Full,
}

/// Concurrent inflight map with a strict admission counter.
///
/// The resident count is tracked separately from the map so that admission
/// can be checked-and-reserved atomically; the map itself only ever holds at
/// most `hard_limit` entries.
pub(crate) struct InflightMap<A: CacheAdapter> {
    map: DashMap<A::Key, Arc<Entry<A>>>,
    resident: AtomicUsize,
}

impl<A: CacheAdapter> std::fmt::Debug for InflightMap<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InflightMap")
            .field("resident", &self.resident.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<A: CacheAdapter> InflightMap<A> {
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
            resident: AtomicUsize::new(0),
        }
    }

    /// Looks up the entry for `key`, allocating one atomically on a miss.
    ///
    /// Per-key serialization comes from the map's shard lock: two racing
    /// creators resolve to a single allocation, and readers never observe a
    /// half-constructed entry.
    pub fn lookup_or_create(
        &self,
        key: &A::Key,
        hard_limit: usize,
        now_millis: u64,
        main_queue_deadline: u64,
    ) -> Lookup<A> {
        if let Some(existing) = self.map.get(key) {
            return Lookup::Existing(Arc::clone(&existing));
        }

        // Reserve a slot before touching the map so the resident count can
        // never exceed the hard limit.
        if self
            .resident
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < hard_limit).then(|| current + 1)
            })
            .is_err()
        {
            return Lookup::Full;
        }

        match self.map.entry(key.clone()) {
            MapEntry::Occupied(occupied) => {
                // Lost the race; hand back the reservation.
                self.resident.fetch_sub(1, Ordering::AcqRel);
                Lookup::Existing(Arc::clone(occupied.get()))
            }
            MapEntry::Vacant(vacant) => {
                let entry = Arc::new(Entry::new(key.clone(), now_millis, main_queue_deadline));
                vacant.insert(Arc::clone(&entry));
                Lookup::Created(entry)
            }
        }
    }

    pub fn get(&self, key: &A::Key) -> Option<Arc<Entry<A>>> {
        self.map.get(key).map(|entry| Arc::clone(&entry))
    }

    /// Removes `entry` from the map, if it is still the resident one.
    ///
    /// A successor entry for the same key (allocated after this one was
    /// removed) is left untouched.
    pub fn remove(&self, entry: &Arc<Entry<A>>) {
        let removed = self
            .map
            .remove_if(entry.key(), |_, resident| Arc::ptr_eq(resident, entry))
            .is_some();
        if removed {
            self.resident.fetch_sub(1, Ordering::AcqRel);
        }
    }

    pub fn len(&self) -> usize {
        self.resident.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains every resident entry, returning them for final teardown.
    pub fn drain(&self) -> Vec<Arc<Entry<A>>> {
        let keys: Vec<A::Key> = self.map.iter().map(|item| item.key().clone()).collect();
        let mut drained = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((_, entry)) = self.map.remove(&key) {
                self.resident.fetch_sub(1, Ordering::AcqRel);
                drained.push(entry);
            }
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CharSeqBacking;

    fn map() -> InflightMap<CharSeqBacking> {
        InflightMap::new()
    }

    #[test]
    fn create_then_lookup_finds_same_entry() {
        let map = map();

        let created = match map.lookup_or_create(&"a".to_owned(), 10, 0, 100) {
            Lookup::Created(entry) => entry,
            _ => panic!("expected a fresh allocation"),
        };
        assert_eq!(map.len(), 1);

        match map.lookup_or_create(&"a".to_owned(), 10, 5, 100) {
            Lookup::Existing(entry) => assert!(Arc::ptr_eq(&entry, &created)),
            _ => panic!("expected the existing entry"),
        }
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn admission_stops_at_hard_limit() {
        let map = map();

        for i in 0..3 {
            assert!(matches!(
                map.lookup_or_create(&format!("k{i}"), 3, 0, 0),
                Lookup::Created(_)
            ));
        }
        assert!(matches!(map.lookup_or_create(&"k3".to_owned(), 3, 0, 0), Lookup::Full));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn remove_frees_a_slot() {
        let map = map();
        let entry = match map.lookup_or_create(&"a".to_owned(), 1, 0, 0) {
            Lookup::Created(entry) => entry,
            _ => panic!("expected a fresh allocation"),
        };
        assert!(matches!(map.lookup_or_create(&"b".to_owned(), 1, 0, 0), Lookup::Full));

        map.remove(&entry);
        assert_eq!(map.len(), 0);
        assert!(matches!(map.lookup_or_create(&"b".to_owned(), 1, 0, 0), Lookup::Created(_)));
    }

    #[test]
    fn remove_ignores_a_successor() {
        let map = map();
        let first = match map.lookup_or_create(&"a".to_owned(), 10, 0, 0) {
            Lookup::Created(entry) => entry,
            _ => panic!("expected a fresh allocation"),
        };
        map.remove(&first);

        let second = match map.lookup_or_create(&"a".to_owned(), 10, 0, 0) {
            Lookup::Created(entry) => entry,
            _ => panic!("expected a fresh allocation"),
        };

        // Removing the stale handle again must not evict the successor.
        map.remove(&first);
        assert_eq!(map.len(), 1);
        assert!(map.get(&"a".to_owned()).is_some_and(|entry| Arc::ptr_eq(&entry, &second)));
    }

    #[test]
    fn drain_empties_the_map() {
        let map = map();
        for i in 0..5 {
            let _ = map.lookup_or_create(&format!("k{i}"), 10, 0, 0);
        }

        let drained = map.drain();
        assert_eq!(drained.len(), 5);
        assert!(map.is_empty());
    }
}

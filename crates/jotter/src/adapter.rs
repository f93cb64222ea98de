// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The host-provided seam between the cache core and its backing storage.

use std::fmt::Debug;
use std::hash::Hash;

use crate::error::BoxError;

/// How an incoming resync (refresh) read is folded into an entry.
///
/// Returned by [`CacheAdapter::resync_decision`]; the default implementation
/// merges pending updates on top of the fresh storage value, which is the
/// behavior almost every cache wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum MergeDecision {
    /// Overwrite the cached value with the fresh storage value and abandon
    /// all pending updates.
    SetDirectly,

    /// Replay the pending updates on top of the fresh storage value.
    MergeData,

    /// Drop the fresh read and keep the cached value; only clears the
    /// resync-pending status.
    ClearReadPendingStatus,

    /// Remove the entry from the cache entirely.
    RemoveFromCache,

    /// Do nothing at all.
    ///
    /// Dangerous: the resync-pending status is left as-is and pending updates
    /// keep accumulating against a stale base. The occurrence is counted but
    /// otherwise ignored.
    DoNothing,
}

/// Adapter implemented by the host: the storage oracle plus the merge
/// semantics of the cached payload.
///
/// One adapter instance is shared by all cache worker threads; implementations
/// must be internally synchronized if they keep state. Storage calls may be
/// long-running; they are issued from queue worker threads (or the configured
/// read/write pools) and never from client calls.
///
/// # Value composition
///
/// The cache maintains the client-visible value eagerly: every accepted
/// update is pushed onto the entry's pending list *and* applied to the cached
/// value via [`apply_update`](Self::apply_update). At write time the pending
/// list is turned into a write payload with
/// [`collect_payload`](Self::collect_payload); at resync time the pending
/// list is replayed onto the freshly-read value with
/// [`resync_merge`](Self::resync_merge).
pub trait CacheAdapter: Send + Sync + 'static {
    /// Cache key.
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// Client-visible cached value.
    type Value: Clone + Send + Sync + 'static;

    /// A single client update.
    type Update: Clone + Send + Sync + 'static;

    /// The unit written out to storage.
    type Payload: Clone + Send + Sync + 'static;

    /// Reads the current storage value for `key`.
    ///
    /// # Errors
    ///
    /// Any error is treated as a failed read attempt and retried up to the
    /// configured budget.
    fn read(&self, key: &Self::Key) -> std::result::Result<Self::Value, BoxError>;

    /// Writes an accumulated payload for `key` to storage.
    ///
    /// # Errors
    ///
    /// Any error is treated as a failed write attempt and retried up to the
    /// configured budget.
    fn write(&self, key: &Self::Key, payload: &Self::Payload) -> std::result::Result<(), BoxError>;

    /// Applies a single update to the client-visible value.
    fn apply_update(&self, value: &mut Self::Value, update: &Self::Update);

    /// Builds a write payload from the updates accumulated since the last
    /// split point.
    ///
    /// Called with a non-empty slice, in arrival order.
    fn collect_payload(&self, updates: &[Self::Update]) -> Self::Payload;

    /// Combines a previously-failed write payload with a newer one.
    ///
    /// Only called when merging of writes is enabled; `earlier` precedes
    /// `later` in arrival order.
    fn merge_payloads(&self, earlier: &Self::Payload, later: &Self::Payload) -> Self::Payload;

    /// Replays pending updates on top of a freshly-read storage value.
    fn resync_merge(&self, fresh: Self::Value, pending: &[Self::Update]) -> Self::Value;

    /// Chooses how a completed resync read is folded into the entry.
    ///
    /// `has_pending` reports whether updates accumulated while the resync was
    /// in flight. The default merges when there is something to merge and
    /// overwrites otherwise.
    fn resync_decision(&self, key: &Self::Key, has_pending: bool) -> MergeDecision {
        let _ = key;
        if has_pending { MergeDecision::MergeData } else { MergeDecision::SetDirectly }
    }

    /// Called by the read-queue worker when it opens a batch of reads.
    ///
    /// The worker collects items for up to the configured batching delay
    /// before invoking storage; hosts that batch storage operations can use
    /// this pair of hooks to bracket them. Default is a no-op.
    fn read_batch_opened(&self, size: usize) {
        let _ = size;
    }

    /// Called when the read batching window elapses. Default is a no-op.
    fn read_batch_closed(&self) {}

    /// Called by the write-queue worker when it opens a batch of writes.
    /// Default is a no-op.
    fn write_batch_opened(&self, size: usize) {
        let _ = size;
    }

    /// Called when the write batching window elapses. Default is a no-op.
    fn write_batch_closed(&self) {}
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Internal event notification for monitoring hooks.

/// An internal cache event.
///
/// Dispatched to the configured [`CacheEventListener`] when
/// `event_notification_enabled` is set. Keys are pre-rendered so events stay
/// independent of the adapter's key type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CacheEvent {
    /// A fresh entry was allocated for a key.
    EntryCreated {
        /// Rendered key.
        key: String,
    },
    /// An entry's initial storage read completed.
    InitialLoadCompleted {
        /// Rendered key.
        key: String,
    },
    /// A resync read was scheduled for an entry.
    ResyncScheduled {
        /// Rendered key.
        key: String,
    },
    /// A write payload was enqueued for an entry.
    WriteEnqueued {
        /// Rendered key.
        key: String,
    },
    /// A storage write completed for an entry.
    WriteCompleted {
        /// Rendered key.
        key: String,
    },
    /// An entry was retained for another cycle.
    EntryRetained {
        /// Rendered key.
        key: String,
    },
    /// An entry expired through the normal path.
    EntryExpired {
        /// Rendered key.
        key: String,
    },
    /// An entry was removed through an error path.
    EntryRemoved {
        /// Rendered key.
        key: String,
    },
}

/// Receiver for internal cache events.
///
/// Listener calls are made from worker threads with no entry lock held;
/// implementations should return quickly.
pub trait CacheEventListener: Send + Sync + 'static {
    /// Handles one event.
    fn on_event(&self, event: &CacheEvent);
}

impl<F> CacheEventListener for F
where
    F: Fn(&CacheEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &CacheEvent) {
        self(event);
    }
}

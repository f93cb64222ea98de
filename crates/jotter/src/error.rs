// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types surfaced to cache clients.

use crate::control::ControlState;

/// Boxed error type carried across the storage boundary.
///
/// Backing implementations report failures as any error type; the cache only
/// needs to log them and decide whether to retry.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error from a client-facing cache operation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The cache has not been started yet.
    #[error("cache has not been started")]
    NotStarted,

    /// The cache has been shut down (or shutdown is in progress).
    #[error("cache is shut down")]
    Shutdown,

    /// The cache is temporarily not usable, e.g. while a flush is running.
    #[error("cache is not usable in control state {state}")]
    NotUsable {
        /// Control state that rejected the operation.
        state: ControlState,
    },

    /// Admission was denied because the cache is at its hard element limit.
    #[error("cache is full (hard limit of {limit} elements)")]
    CacheFull {
        /// The configured hard limit.
        limit: usize,
    },

    /// The entry exists but its initial storage read has not completed.
    #[error("cache entry is not yet loaded")]
    NotYetLoaded,

    /// The entry's storage read failed permanently.
    #[error("cache entry failed to load: {cause}")]
    FailedToLoad {
        /// Human-readable description of the final failure.
        cause: String,
    },

    /// Every lookup attempt observed the entry being removed from the cache.
    #[error("entry was repeatedly removed from cache; gave up after {attempts} attempts")]
    RemovedFromCacheRetryExhausted {
        /// Number of lookup attempts made.
        attempts: u32,
    },

    /// The per-entry pending-update limit was reached.
    #[error("too many updates pending for this key (limit {limit})")]
    TooManyUpdates {
        /// The configured `max_updates_to_collect`.
        limit: usize,
    },

    /// A blocking read wait expired before the entry loaded.
    #[error("timed out waiting for the cache entry to load")]
    Timeout,
}

/// A specialized [`Result`] type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(CacheError: Send, Sync, std::error::Error);
    }

    #[test]
    fn display_names_the_limit() {
        let err = CacheError::TooManyUpdates { limit: 16 };
        assert_eq!(err.to_string(), "too many updates pending for this key (limit 16)");

        let err = CacheError::CacheFull { limit: 1000 };
        assert!(err.to_string().contains("1000"));
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Write-behind, resync-in-background caching.
//!
//! This crate provides [`WriteBehindCache`], an in-memory caching layer that
//! sits between application code and a slow, fallible backing store. It
//! accepts frequent reads and many small updates per key, absorbs them in
//! memory, and asynchronously:
//!
//! - writes the accumulated updates out to storage, and
//! - re-reads ("resyncs") from storage to reconcile in-memory state with
//!   concurrent external writers.
//!
//! Entries flow through a four-queue pipeline (read, main, write, return)
//! driven by dedicated worker threads. Each **cache cycle** an entry's
//! accumulated updates are split into a write payload, a resync read is
//! scheduled, and the entry either expires, is retained for another cycle,
//! or is removed. Failures are retried against bounded budgets, and the
//! outcome of every pipeline stage is visible through counters on the
//! [`CacheStatus`] snapshot.
//!
//! The backing store and payload semantics are supplied through the
//! [`CacheAdapter`] trait; [`testing::CharSeqBacking`] is a ready-made
//! character-sequence implementation for tests and examples.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use jotter::{CacheOptions, WriteBehindCache};
//! use jotter::testing::CharSeqBacking;
//!
//! let backing = CharSeqBacking::new();
//! let options = CacheOptions::builder("docs")
//!     .main_queue_cache_time(Duration::from_millis(50))
//!     .main_queue_cache_time_min(Duration::from_millis(10))
//!     .return_queue_cache_time_min(Duration::from_millis(20))
//!     .max_sleep_time(Duration::from_millis(10))
//!     .build()?;
//!
//! let cache = WriteBehindCache::new(backing.clone(), options);
//! cache.start()?;
//!
//! // Blocks until the initial storage read completes.
//! let initial = cache.read_for(&"greeting".to_owned(), Duration::from_millis(500))?;
//! assert_eq!(initial.as_deref(), Some(""));
//!
//! cache.write_if_cached(&"greeting".to_owned(), 'h')?;
//! cache.write_if_cached(&"greeting".to_owned(), 'i')?;
//!
//! // Shutdown drains the pipeline; the updates reach storage.
//! assert!(cache.shutdown_for(Duration::from_secs(3))?);
//! assert_eq!(backing.get("greeting"), Some("hi".to_owned()));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod adapter;
mod cache;
mod config;
mod control;
mod core;
mod entry;
mod error;
mod events;
mod inflight;
mod message;
mod monitor;
mod pool;
mod status;
pub mod testing;
mod throttle;
mod workers;

pub use adapter::{CacheAdapter, MergeDecision};
pub use cache::WriteBehindCache;
pub use config::{
    CacheOptions, CacheOptionsBuilder, ConfigError, PoolSize, ReadFailedFinalAction, ResyncFailedFinalAction,
    ResyncTooLateAction,
};
pub use control::ControlState;
pub use error::{BoxError, CacheError, Result};
pub use events::{CacheEvent, CacheEventListener};
pub use message::{CacheMessage, SEVERITY_COUNT, Severity};
pub use status::CacheStatus;

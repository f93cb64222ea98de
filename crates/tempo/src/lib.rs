// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Virtual-time primitives for thread-based services.
//!
//! Working with time is notoriously difficult to test. This crate provides a
//! [`Clock`] handle that services consult for every scheduling decision, so
//! that tests can substitute a controlled clock and move time forward
//! explicitly instead of sleeping for real.
//!
//! The clock hands out *virtual milliseconds*: a monotonic millisecond count
//! relative to the clock's origin. Virtual milliseconds never cross process
//! boundaries; they exist purely so that deadlines can be compared cheaply
//! and manipulated in tests.
//!
//! # Examples
//!
//! Production code takes a clock and never looks at the wall directly:
//!
//! ```
//! use tempo::Clock;
//!
//! # fn schedule(clock: &Clock) {
//! let deadline = clock.now_millis() + 250;
//! // ... store the deadline, compare it against clock.now_millis() later
//! # }
//! ```
//!
//! Tests drive time by hand:
//!
//! ```
//! use std::time::Duration;
//! use tempo::ClockControl;
//!
//! let control = ClockControl::new();
//! let clock = control.to_clock();
//!
//! let before = clock.now_millis();
//! control.advance(Duration::from_secs(5));
//! assert_eq!(clock.now_millis() - before, 5_000);
//! ```

mod clock;
#[cfg(any(feature = "test-util", test))]
mod control;

pub use clock::Clock;
#[cfg(any(feature = "test-util", test))]
pub use control::ClockControl;

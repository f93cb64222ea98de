// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, Instant, SystemTime};

#[cfg(any(feature = "test-util", test))]
use crate::control::ClockControl;

/// Provides an abstraction for time-related operations.
///
/// The clock is the only source of time a service should consult. In
/// production it is backed by the operating system; in tests it can be backed
/// by a [`ClockControl`] (requires the `test-util` feature), which freezes
/// time until the test advances it explicitly.
///
/// # Virtual milliseconds
///
/// [`now_millis()`][Self::now_millis] returns a monotonic millisecond count
/// relative to the clock's origin (the moment the clock, or its controlling
/// [`ClockControl`], was created). All clones of a clock share the same
/// origin, so deadlines computed on one clone compare correctly against
/// readings taken on another.
///
/// # Sleeping
///
/// [`sleep()`][Self::sleep] blocks the calling thread. On a system clock this
/// is a plain thread sleep. On a controlled clock the thread parks until the
/// controlling test advances virtual time past the wake-up point, which makes
/// time-dependent code fully deterministic under test.
///
/// # Examples
///
/// ```
/// use tempo::Clock;
///
/// let clock = Clock::new();
/// let t1 = clock.now_millis();
/// let t2 = clock.now_millis();
/// assert!(t2 >= t1);
/// ```
#[derive(Debug, Clone)]
pub struct Clock(ClockInner);

#[derive(Debug, Clone)]
enum ClockInner {
    System { origin: Instant },

    #[cfg(any(feature = "test-util", test))]
    Control(ClockControl),
}

impl Clock {
    /// Creates a new clock backed by the operating system.
    ///
    /// The clock's origin is the moment of this call; `now_millis()` starts
    /// near zero and grows with real time.
    #[must_use]
    pub fn new() -> Self {
        Self(ClockInner::System { origin: Instant::now() })
    }

    /// Creates a new frozen clock.
    ///
    /// Convenience for `ClockControl::new().to_clock()`. The returned clock
    /// does not advance on its own; without a surviving [`ClockControl`] it
    /// stays frozen forever.
    #[cfg(any(feature = "test-util", test))]
    #[must_use]
    pub fn new_frozen() -> Self {
        ClockControl::new().to_clock()
    }

    #[cfg(any(feature = "test-util", test))]
    pub(crate) fn with_control(control: &ClockControl) -> Self {
        Self(ClockInner::Control(control.clone()))
    }

    /// Retrieves the current virtual time in milliseconds since the clock's
    /// origin.
    ///
    /// Monotonic and non-decreasing across all clones of this clock.
    #[must_use]
    pub fn now_millis(&self) -> u64 {
        match &self.0 {
            ClockInner::System { origin } => duration_to_millis(origin.elapsed()),
            #[cfg(any(feature = "test-util", test))]
            ClockInner::Control(control) => control.now_millis(),
        }
    }

    /// Retrieves the current monotonic [`Instant`].
    ///
    /// On a controlled clock, the instant is the control's base instant
    /// advanced by the virtual offset, so `Instant` arithmetic stays
    /// consistent with [`now_millis()`][Self::now_millis].
    #[must_use]
    pub fn instant(&self) -> Instant {
        match &self.0 {
            ClockInner::System { .. } => Instant::now(),
            #[cfg(any(feature = "test-util", test))]
            ClockInner::Control(control) => control.instant(),
        }
    }

    /// Retrieves the current absolute time as [`SystemTime`].
    ///
    /// Not monotonic on a system clock; affected by wall-clock changes.
    #[must_use]
    pub fn system_time(&self) -> SystemTime {
        match &self.0 {
            ClockInner::System { .. } => SystemTime::now(),
            #[cfg(any(feature = "test-util", test))]
            ClockInner::Control(control) => control.system_time(),
        }
    }

    /// Blocks the calling thread for the given duration of virtual time.
    ///
    /// On a controlled clock the thread parks until the control advances
    /// virtual time past the wake-up point.
    pub fn sleep(&self, duration: Duration) {
        match &self.0 {
            ClockInner::System { .. } => std::thread::sleep(duration),
            #[cfg(any(feature = "test-util", test))]
            ClockInner::Control(control) => {
                let deadline = control.now_millis().saturating_add(duration_to_millis(duration));
                control.park_until(deadline);
            }
        }
    }

    /// Blocks until virtual time reaches `deadline_millis`.
    ///
    /// Returns immediately if the deadline is already in the past.
    pub fn sleep_until_millis(&self, deadline_millis: u64) {
        match &self.0 {
            ClockInner::System { origin } => {
                let now = duration_to_millis(origin.elapsed());
                if let Some(remaining) = deadline_millis.checked_sub(now)
                    && remaining > 0
                {
                    std::thread::sleep(Duration::from_millis(remaining));
                }
            }
            #[cfg(any(feature = "test-util", test))]
            ClockInner::Control(control) => control.park_until(deadline_millis),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<Self> for Clock {
    fn as_ref(&self) -> &Self {
        self
    }
}

impl From<&Self> for Clock {
    fn from(clock: &Self) -> Self {
        clock.clone()
    }
}

pub(crate) fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Clock: Send, Sync, Clone, AsRef<Clock>);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = Clock::new();
        let t1 = clock.now_millis();
        let t2 = clock.now_millis();
        assert!(t2 >= t1);
    }

    #[test]
    fn clones_share_origin() {
        let clock = Clock::new();
        let clone = clock.clone();

        let t1 = clock.now_millis();
        let t2 = clone.now_millis();
        assert!(t2 >= t1);
        assert!(t2 - t1 < 1_000);
    }

    #[test]
    fn frozen_clock_does_not_advance() {
        let clock = Clock::new_frozen();

        let t1 = clock.now_millis();
        thread::sleep(Duration::from_millis(2));
        assert_eq!(t1, clock.now_millis());
    }

    #[test]
    fn sleep_until_past_deadline_returns_immediately() {
        let clock = Clock::new();
        let now = clock.now_millis();
        clock.sleep_until_millis(now.saturating_sub(100));
    }

    #[test]
    fn controlled_sleep_wakes_on_advance() {
        let control = ClockControl::new();
        let clock = control.to_clock();

        let sleeper = thread::spawn(move || {
            clock.sleep(Duration::from_millis(500));
        });

        // The sleeper can only finish once virtual time has moved.
        thread::sleep(Duration::from_millis(5));
        assert!(!sleeper.is_finished());

        control.advance(Duration::from_millis(500));
        sleeper.join().unwrap();
    }
}

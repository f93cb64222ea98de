// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Condvar, Mutex};

use crate::Clock;
use crate::clock::duration_to_millis;

/// Controls the passage of time in tests.
///
/// This is useful for testing time-sensitive code without having to wait for
/// real time to pass. `ClockControl` is available when the `test-util`
/// feature is enabled.
///
/// To create a [`Clock`] from `ClockControl`, use the
/// [`to_clock()`][Self::to_clock] method. All clocks created from the same
/// control (and all their clones) share the same virtual time.
///
/// Threads parked in [`Clock::sleep`] on a controlled clock are woken by
/// [`advance()`][Self::advance]; a test that never advances time will leave
/// them parked.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tempo::ClockControl;
///
/// let control = ClockControl::new();
/// let clock = control.to_clock();
///
/// let before = clock.system_time();
/// control.advance(Duration::from_secs(1));
/// assert_eq!(clock.system_time().duration_since(before)?, Duration::from_secs(1));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// # Production code and `ClockControl`
///
/// Never enable the `test-util` feature in production builds; it exists for
/// `dev-dependencies` only.
#[derive(Clone)]
pub struct ClockControl {
    shared: Arc<ControlShared>,
}

struct ControlShared {
    state: Mutex<State>,
    parked: Condvar,
}

struct State {
    offset_millis: u64,
    base_system: SystemTime,
    base_instant: Instant,
    auto_advance_millis: u64,
}

impl std::fmt::Debug for ClockControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();

        f.debug_struct("ClockControl")
            .field("offset_millis", &state.offset_millis)
            .field("auto_advance_millis", &state.auto_advance_millis)
            .finish_non_exhaustive()
    }
}

impl Default for ClockControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockControl {
    /// Creates a new `ClockControl` instance.
    ///
    /// Virtual time starts at zero; auto-advance is disabled; the absolute
    /// base time is the wall clock at the moment of this call.
    #[must_use]
    pub fn new() -> Self {
        Self::new_at(SystemTime::now())
    }

    /// Creates a new `ClockControl` whose absolute base time is `base`.
    #[must_use]
    pub fn new_at(base: impl Into<SystemTime>) -> Self {
        Self {
            shared: Arc::new(ControlShared {
                state: Mutex::new(State {
                    offset_millis: 0,
                    base_system: base.into(),
                    base_instant: Instant::now(),
                    auto_advance_millis: 0,
                }),
                parked: Condvar::new(),
            }),
        }
    }

    /// Automatically advances virtual time by `step` on every time reading.
    ///
    /// Useful for code that polls the clock in a loop and would otherwise
    /// never observe progress under a frozen clock.
    #[must_use]
    pub fn auto_advance(self, step: Duration) -> Self {
        {
            let mut state = self.shared.state.lock();
            state.auto_advance_millis = duration_to_millis(step);
        }
        self
    }

    /// Creates a [`Clock`] driven by this control.
    #[must_use]
    pub fn to_clock(&self) -> Clock {
        Clock::with_control(self)
    }

    /// Advances virtual time by the given duration and wakes parked sleepers.
    pub fn advance(&self, duration: Duration) {
        {
            let mut state = self.shared.state.lock();
            state.offset_millis = state.offset_millis.saturating_add(duration_to_millis(duration));
        }
        self.shared.parked.notify_all();
    }

    pub(crate) fn now_millis(&self) -> u64 {
        let mut state = self.shared.state.lock();
        let now = state.offset_millis;
        if state.auto_advance_millis > 0 {
            state.offset_millis = now.saturating_add(state.auto_advance_millis);
            drop(state);
            self.shared.parked.notify_all();
        }
        now
    }

    pub(crate) fn instant(&self) -> Instant {
        let state = self.shared.state.lock();
        state.base_instant + Duration::from_millis(state.offset_millis)
    }

    pub(crate) fn system_time(&self) -> SystemTime {
        let state = self.shared.state.lock();
        state.base_system + Duration::from_millis(state.offset_millis)
    }

    /// Parks the calling thread until virtual time reaches `deadline_millis`.
    pub(crate) fn park_until(&self, deadline_millis: u64) {
        let mut state = self.shared.state.lock();
        while state.offset_millis < deadline_millis {
            self.shared.parked.wait(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(ClockControl: Send, Sync, Clone);
    }

    #[test]
    fn advance_moves_virtual_time() {
        let control = ClockControl::new();
        let clock = control.to_clock();

        assert_eq!(clock.now_millis(), 0);
        control.advance(Duration::from_millis(1_500));
        assert_eq!(clock.now_millis(), 1_500);
    }

    #[test]
    fn new_at_sets_absolute_base() {
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let control = ClockControl::new_at(base);
        let clock = control.to_clock();

        assert_eq!(clock.system_time(), base);

        control.advance(Duration::from_secs(10));
        assert_eq!(clock.system_time(), base + Duration::from_secs(10));
    }

    #[test]
    fn auto_advance_ticks_on_every_reading() {
        let control = ClockControl::new().auto_advance(Duration::from_millis(100));
        let clock = control.to_clock();

        assert_eq!(clock.now_millis(), 0);
        assert_eq!(clock.now_millis(), 100);
        assert_eq!(clock.now_millis(), 200);
    }

    #[test]
    fn instant_tracks_offset() {
        let control = ClockControl::new();
        let clock = control.to_clock();

        let before = clock.instant();
        control.advance(Duration::from_millis(250));
        assert_eq!(clock.instant().duration_since(before), Duration::from_millis(250));
    }
}

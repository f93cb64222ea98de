// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache lifecycle: control states and transition rules.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::CacheError;

/// Lifecycle state of a cache instance.
///
/// Transitions: `NotStarted → Running → (Flushing → Running)* →
/// ShutdownInProgress → ShutdownCompleted`. Shutdown can be entered from any
/// non-shutdown state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlState {
    /// The cache has been constructed but not started.
    NotStarted = 0,
    /// Normal operation.
    Running = 1,
    /// A flush is draining the cache; client operations are rejected.
    Flushing = 2,
    /// Shutdown is draining the cache.
    ShutdownInProgress = 3,
    /// The cache is fully terminated.
    ShutdownCompleted = 4,
}

impl ControlState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Running,
            2 => Self::Flushing,
            3 => Self::ShutdownInProgress,
            _ => Self::ShutdownCompleted,
        }
    }

    /// Whether this is one of the two shutdown states.
    #[must_use]
    pub const fn is_shutdown(self) -> bool {
        matches!(self, Self::ShutdownInProgress | Self::ShutdownCompleted)
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Running => "RUNNING",
            Self::Flushing => "FLUSHING",
            Self::ShutdownInProgress => "SHUTDOWN_IN_PROGRESS",
            Self::ShutdownCompleted => "SHUTDOWN_COMPLETED",
        };
        f.write_str(name)
    }
}

/// Shared lifecycle state consulted by client calls and worker loops.
#[derive(Debug)]
pub(crate) struct Controller {
    state: AtomicU8,
}

impl Default for Controller {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(ControlState::NotStarted as u8),
        }
    }
}

impl Controller {
    pub fn state(&self) -> ControlState {
        ControlState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Checks that a client read/write may proceed.
    pub fn gate_client_op(&self) -> Result<(), CacheError> {
        match self.state() {
            ControlState::Running => Ok(()),
            ControlState::NotStarted => Err(CacheError::NotStarted),
            ControlState::Flushing => Err(CacheError::NotUsable {
                state: ControlState::Flushing,
            }),
            ControlState::ShutdownInProgress | ControlState::ShutdownCompleted => Err(CacheError::Shutdown),
        }
    }

    pub fn try_start(&self) -> Result<(), CacheError> {
        match self.compare_exchange(ControlState::NotStarted, ControlState::Running) {
            Ok(()) => Ok(()),
            Err(actual) if actual.is_shutdown() => Err(CacheError::Shutdown),
            Err(actual) => Err(CacheError::NotUsable { state: actual }),
        }
    }

    pub fn try_begin_flush(&self) -> Result<(), CacheError> {
        match self.compare_exchange(ControlState::Running, ControlState::Flushing) {
            Ok(()) => Ok(()),
            Err(ControlState::NotStarted) => Err(CacheError::NotStarted),
            Err(actual) if actual.is_shutdown() => Err(CacheError::Shutdown),
            Err(actual) => Err(CacheError::NotUsable { state: actual }),
        }
    }

    pub fn end_flush(&self) {
        // A shutdown may have pre-empted the flush; never regress out of it.
        let _ = self.compare_exchange(ControlState::Flushing, ControlState::Running);
    }

    pub fn try_begin_shutdown(&self) -> Result<(), CacheError> {
        loop {
            let current = self.state();
            if current.is_shutdown() {
                return Err(CacheError::Shutdown);
            }
            if self.compare_exchange(current, ControlState::ShutdownInProgress).is_ok() {
                return Ok(());
            }
        }
    }

    pub fn complete_shutdown(&self) {
        self.state
            .store(ControlState::ShutdownCompleted as u8, Ordering::Release);
    }

    /// Whether worker loops should drain aggressively (flush or shutdown).
    pub fn is_draining(&self) -> bool {
        matches!(
            self.state(),
            ControlState::Flushing | ControlState::ShutdownInProgress
        )
    }

    /// Whether worker loops should exit.
    pub fn is_terminated(&self) -> bool {
        self.state() == ControlState::ShutdownCompleted
    }

    fn compare_exchange(&self, from: ControlState, to: ControlState) -> Result<(), ControlState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| ControlState::from_u8(actual))
    }
}

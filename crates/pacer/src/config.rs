// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Pacer configuration.

use std::time::Duration;

use crate::error::ConfigError;

pub(crate) fn to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Typed pacer configuration, built through [`PacerOptions::builder`].
#[derive(Debug, Clone)]
pub struct PacerOptions {
    name: String,
    max_pending_requests: usize,
    max_attempts: u32,
    delays_after_failure: Vec<Duration>,
    early_processing_grace: Duration,
    max_sleep_time: Duration,
    executor_threads: usize,
}

impl PacerOptions {
    /// Creates a builder with defaults and the given pacer name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> PacerOptionsBuilder {
        PacerOptionsBuilder::new(name)
    }

    /// Identifier used in thread names and logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound on requests admitted but not yet done or failed.
    #[must_use]
    pub fn max_pending_requests(&self) -> usize {
        self.max_pending_requests
    }

    /// Total attempts allowed per request, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry attempt `n`, indexed by `n - 1` and clamped to the
    /// last element.
    #[must_use]
    pub fn delay_after_failure(&self, attempt_index: u32) -> Duration {
        let index = (attempt_index as usize).min(self.delays_after_failure.len() - 1);
        self.delays_after_failure[index]
    }

    /// The configured delay ladder.
    #[must_use]
    pub fn delays_after_failure(&self) -> &[Duration] {
        &self.delays_after_failure
    }

    /// How much earlier than its deadline a delayed request may be released
    /// for dispatch, to amortize wakeups.
    #[must_use]
    pub fn early_processing_grace(&self) -> Duration {
        self.early_processing_grace
    }

    /// Longest uninterrupted block any pacer thread may take.
    #[must_use]
    pub fn max_sleep_time(&self) -> Duration {
        self.max_sleep_time
    }

    /// Fixed size of the request executor pool.
    #[must_use]
    pub fn executor_threads(&self) -> usize {
        self.executor_threads
    }
}

/// Builder for [`PacerOptions`].
#[derive(Debug, Clone)]
pub struct PacerOptionsBuilder {
    name: String,
    max_pending_requests: usize,
    max_attempts: u32,
    delays_after_failure: Vec<Duration>,
    early_processing_grace: Duration,
    max_sleep_time: Duration,
    executor_threads: usize,
}

impl PacerOptionsBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_pending_requests: 1_000,
            max_attempts: 4,
            delays_after_failure: vec![
                Duration::from_millis(100),
                Duration::from_millis(500),
                Duration::from_secs(2),
            ],
            early_processing_grace: Duration::from_millis(20),
            max_sleep_time: Duration::from_millis(100),
            executor_threads: 2,
        }
    }

    /// Bound on admitted-but-unfinished requests.
    #[must_use]
    pub fn max_pending_requests(mut self, value: usize) -> Self {
        self.max_pending_requests = value;
        self
    }

    /// Total attempts allowed per request.
    #[must_use]
    pub fn max_attempts(mut self, value: u32) -> Self {
        self.max_attempts = value;
        self
    }

    /// Retry delay ladder; the last element repeats for later attempts.
    #[must_use]
    pub fn delays_after_failure(mut self, value: Vec<Duration>) -> Self {
        self.delays_after_failure = value;
        self
    }

    /// Early-dispatch grace window.
    #[must_use]
    pub fn early_processing_grace(mut self, value: Duration) -> Self {
        self.early_processing_grace = value;
        self
    }

    /// Longest uninterrupted block any pacer thread may take.
    #[must_use]
    pub fn max_sleep_time(mut self, value: Duration) -> Self {
        self.max_sleep_time = value;
        self
    }

    /// Fixed executor pool size.
    #[must_use]
    pub fn executor_threads(mut self, value: usize) -> Self {
        self.executor_threads = value;
        self
    }

    /// Validates and produces [`PacerOptions`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on an empty name, a zero attempt budget, an
    /// empty delay ladder, a zero sleep bound, a zero pending bound, or a
    /// zero-thread executor.
    pub fn build(self) -> Result<PacerOptions, ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError {
                reason: "pacer name must not be empty".into(),
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError {
                reason: "max_attempts must be positive".into(),
            });
        }
        if self.delays_after_failure.is_empty() {
            return Err(ConfigError {
                reason: "delays_after_failure must not be empty".into(),
            });
        }
        if self.max_sleep_time.is_zero() {
            return Err(ConfigError {
                reason: "max_sleep_time must be positive".into(),
            });
        }
        if self.max_pending_requests == 0 {
            return Err(ConfigError {
                reason: "max_pending_requests must be positive".into(),
            });
        }
        if self.executor_threads == 0 {
            return Err(ConfigError {
                reason: "executor_threads must be positive".into(),
            });
        }
        Ok(PacerOptions {
            name: self.name,
            max_pending_requests: self.max_pending_requests,
            max_attempts: self.max_attempts,
            delays_after_failure: self.delays_after_failure,
            early_processing_grace: self.early_processing_grace,
            max_sleep_time: self.max_sleep_time,
            executor_threads: self.executor_threads,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let options = PacerOptions::builder("test").build().unwrap();
        assert_eq!(options.name(), "test");
        assert_eq!(options.max_attempts(), 4);
    }

    #[test]
    fn delay_ladder_clamps_to_last_element() {
        let options = PacerOptions::builder("test")
            .delays_after_failure(vec![Duration::from_millis(10), Duration::from_millis(50)])
            .build()
            .unwrap();

        assert_eq!(options.delay_after_failure(0), Duration::from_millis(10));
        assert_eq!(options.delay_after_failure(1), Duration::from_millis(50));
        assert_eq!(options.delay_after_failure(7), Duration::from_millis(50));
    }

    #[test]
    fn empty_ladder_is_rejected() {
        assert!(PacerOptions::builder("test").delays_after_failure(vec![]).build().is_err());
    }

    #[test]
    fn zero_attempts_is_rejected() {
        assert!(PacerOptions::builder("test").max_attempts(0).build().is_err());
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for request submission and configuration.

/// Boxed error type returned by request executors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error from [`Pacer::submit`](crate::Pacer::submit).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SubmitError {
    /// The pacer has not been started yet.
    #[error("pacer has not been started")]
    NotStarted,

    /// The pacer is already running.
    #[error("pacer is already running")]
    AlreadyStarted,

    /// The pacer has been shut down.
    #[error("pacer is shut down")]
    Shutdown,

    /// The bounded pending-request set is full.
    #[error("too many pending requests (limit {limit})")]
    TooManyPendingRequests {
        /// The configured `max_pending_requests`.
        limit: usize,
    },
}

/// Error produced when [`PacerOptionsBuilder::build`](crate::PacerOptionsBuilder::build)
/// rejects a configuration.
#[derive(Debug, thiserror::Error)]
#[error("invalid pacer configuration: {reason}")]
pub struct ConfigError {
    pub(crate) reason: String,
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Typed log messages with fixed severities.

use std::fmt;

/// Severity of a cache log message.
///
/// The `External*` severities mark conditions caused by or visible to the
/// world outside the cache (storage failures, data loss) as opposed to
/// internal bookkeeping noise; monitoring tracks the last message per
/// severity separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Severity {
    /// Internal diagnostics.
    Debug = 0,
    /// Internal informational messages.
    Info = 1,
    /// Informational messages about external interactions.
    ExternalInfo = 2,
    /// Internal warnings.
    Warn = 3,
    /// Warnings about external interactions.
    ExternalWarn = 4,
    /// Internal errors.
    Error = 5,
    /// Errors in external interactions.
    ExternalError = 6,
    /// Updates accepted by the cache were irrecoverably lost.
    ExternalDataLoss = 7,
    /// The cache itself is broken.
    Fatal = 8,
}

/// Number of distinct severities; sizes the per-severity monitoring arrays.
pub const SEVERITY_COUNT: usize = 9;

impl Severity {
    /// Ordinal used to index per-severity monitoring arrays.
    #[must_use]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    /// All severities in ordinal order.
    #[must_use]
    pub const fn all() -> [Self; SEVERITY_COUNT] {
        [
            Self::Debug,
            Self::Info,
            Self::ExternalInfo,
            Self::Warn,
            Self::ExternalWarn,
            Self::Error,
            Self::ExternalError,
            Self::ExternalDataLoss,
            Self::Fatal,
        ]
    }

    /// Whether this severity is at least warning-grade.
    #[must_use]
    pub const fn is_warning_or_above(self) -> bool {
        self.ordinal() >= Self::Warn.ordinal()
    }

    /// Whether this severity is at least error-grade.
    #[must_use]
    pub const fn is_error_or_above(self) -> bool {
        self.ordinal() >= Self::Error.ordinal()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::ExternalInfo => "EXTERNAL_INFO",
            Self::Warn => "WARN",
            Self::ExternalWarn => "EXTERNAL_WARN",
            Self::Error => "ERROR",
            Self::ExternalError => "EXTERNAL_ERROR",
            Self::ExternalDataLoss => "EXTERNAL_DATA_LOSS",
            Self::Fatal => "FATAL",
        };
        f.write_str(name)
    }
}

/// A typed cache log message.
///
/// Each variant carries a fixed severity and throttle classifier. Keys are
/// pre-rendered to strings so messages stay independent of the adapter's key
/// type. [`NonStandard`](Self::NonStandard) lets callers inject messages with
/// their own `(severity, classifier)` pair.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CacheMessage {
    /// The cache started and its worker threads are running.
    Started,
    /// A flush completed and the cache returned to normal operation.
    FlushCompleted,
    /// Shutdown finished; all queues drained and threads terminated.
    ShutdownCompleted,
    /// A storage read failed and will be retried.
    ReadRetryIssued {
        /// Rendered key.
        key: String,
    },
    /// An initial storage read exhausted its retry budget.
    ReadInitialFailedFinal {
        /// Rendered key.
        key: String,
        /// Final failure description.
        cause: String,
    },
    /// A resync read exhausted its retry budget.
    ResyncFailedFinal {
        /// Rendered key.
        key: String,
        /// Final failure description.
        cause: String,
    },
    /// A resync read arrived after the entry had advanced past its merge
    /// point and was dropped.
    ResyncTooLate {
        /// Rendered key.
        key: String,
    },
    /// A resync produced the do-nothing merge decision.
    MergeDoNothing {
        /// Rendered key.
        key: String,
    },
    /// A storage write failed and will be retried.
    WriteRetryIssued {
        /// Rendered key.
        key: String,
    },
    /// A storage write exhausted its retry budget and the payload was kept
    /// for merging into a later write.
    WriteFailedFinalPayloadKept {
        /// Rendered key.
        key: String,
    },
    /// A storage write exhausted its retry budget and the payload was
    /// dropped.
    WriteFailedFinalDataLost {
        /// Rendered key.
        key: String,
    },
    /// An entry exceeded its cycle-level failure budget and was removed.
    RemovedUnrecoverable {
        /// Rendered key.
        key: String,
        /// Number of pending updates lost with the entry.
        lost_updates: usize,
    },
    /// Return-queue processing observed a negative time-since-last-access.
    NegativeTimeSinceLastAccess {
        /// Rendered key.
        key: String,
    },
    /// An entry was not retained because the main queue is at its size
    /// target.
    NotRetainedDueToMainQueueSize {
        /// Rendered key.
        key: String,
    },
    /// A storage call panicked; the panic was contained and treated as a
    /// failure.
    StoragePanic {
        /// Rendered key.
        key: String,
    },
    /// Synthetic marker: messages of this type may be skipped from now on.
    MessagesMayBeSkippedFor {
        /// Throttle classifier the marker refers to.
        classifier: String,
        /// Severity the marker refers to.
        severity: Severity,
    },
    /// Synthetic marker: messages of this type were skipped while throttled.
    PreviousMessagesSkipped {
        /// Throttle classifier the marker refers to.
        classifier: String,
        /// Severity the marker refers to.
        severity: Severity,
        /// How many messages were skipped during the throttled streak.
        skipped: u64,
    },
    /// A caller-supplied message with an explicit severity and classifier.
    NonStandard {
        /// Caller-chosen severity.
        severity: Severity,
        /// Caller-chosen throttle classifier.
        classifier: String,
        /// Message text.
        text: String,
    },
}

impl CacheMessage {
    /// The fixed severity of this message.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::Started | Self::FlushCompleted | Self::ShutdownCompleted => Severity::Info,
            Self::ReadRetryIssued { .. } | Self::WriteRetryIssued { .. } => Severity::ExternalInfo,
            Self::ResyncTooLate { .. }
            | Self::MergeDoNothing { .. }
            | Self::NotRetainedDueToMainQueueSize { .. }
            | Self::MessagesMayBeSkippedFor { .. }
            | Self::PreviousMessagesSkipped { .. } => Severity::Warn,
            Self::WriteFailedFinalPayloadKept { .. } => Severity::ExternalWarn,
            Self::NegativeTimeSinceLastAccess { .. } | Self::StoragePanic { .. } => Severity::Error,
            Self::ReadInitialFailedFinal { .. } | Self::ResyncFailedFinal { .. } | Self::RemovedUnrecoverable { .. } => {
                Severity::ExternalError
            }
            Self::WriteFailedFinalDataLost { .. } => Severity::ExternalDataLoss,
            Self::NonStandard { severity, .. } => *severity,
        }
    }

    /// The throttle classifier of this message.
    ///
    /// Throttling operates per `(classifier, severity)` pair.
    #[must_use]
    pub fn classifier(&self) -> &str {
        match self {
            Self::Started => "STARTED",
            Self::FlushCompleted => "FLUSH_COMPLETED",
            Self::ShutdownCompleted => "SHUTDOWN_COMPLETED",
            Self::ReadRetryIssued { .. } => "READ_RETRY_ISSUED",
            Self::ReadInitialFailedFinal { .. } => "READ_INITIAL_FAILED_FINAL",
            Self::ResyncFailedFinal { .. } => "RESYNC_FAILED_FINAL",
            Self::ResyncTooLate { .. } => "RESYNC_TOO_LATE",
            Self::MergeDoNothing { .. } => "MERGE_DO_NOTHING",
            Self::WriteRetryIssued { .. } => "WRITE_RETRY_ISSUED",
            Self::WriteFailedFinalPayloadKept { .. } => "WRITE_FAILED_FINAL_PAYLOAD_KEPT",
            Self::WriteFailedFinalDataLost { .. } => "WRITE_FAILED_FINAL_DATA_LOST",
            Self::RemovedUnrecoverable { .. } => "REMOVED_UNRECOVERABLE",
            Self::NegativeTimeSinceLastAccess { .. } => "NEGATIVE_TIME_SINCE_LAST_ACCESS",
            Self::NotRetainedDueToMainQueueSize { .. } => "NOT_RETAINED_DUE_TO_MAIN_QUEUE_SIZE",
            Self::StoragePanic { .. } => "STORAGE_PANIC",
            Self::MessagesMayBeSkippedFor { .. } => "MESSAGES_MAY_BE_SKIPPED_FOR",
            Self::PreviousMessagesSkipped { .. } => "PREVIOUS_MESSAGES_SKIPPED",
            Self::NonStandard { classifier, .. } => classifier,
        }
    }

    /// Whether this message is a synthetic throttle marker.
    ///
    /// Markers bypass throttling; throttling a throttle notice would hide
    /// the fact that messages are being dropped.
    #[must_use]
    pub fn is_throttle_marker(&self) -> bool {
        matches!(
            self,
            Self::MessagesMayBeSkippedFor { .. } | Self::PreviousMessagesSkipped { .. }
        )
    }
}

impl fmt::Display for CacheMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "cache started"),
            Self::FlushCompleted => write!(f, "flush completed"),
            Self::ShutdownCompleted => write!(f, "shutdown completed"),
            Self::ReadRetryIssued { key } => write!(f, "storage read failed, retrying [{key}]"),
            Self::ReadInitialFailedFinal { key, cause } => {
                write!(f, "initial storage read failed permanently [{key}]: {cause}")
            }
            Self::ResyncFailedFinal { key, cause } => {
                write!(f, "resync read failed permanently [{key}]: {cause}")
            }
            Self::ResyncTooLate { key } => write!(f, "resync read arrived too late, dropped [{key}]"),
            Self::MergeDoNothing { key } => write!(f, "resync merge decision was do-nothing [{key}]"),
            Self::WriteRetryIssued { key } => write!(f, "storage write failed, retrying [{key}]"),
            Self::WriteFailedFinalPayloadKept { key } => {
                write!(f, "storage write failed permanently, payload kept for merge [{key}]")
            }
            Self::WriteFailedFinalDataLost { key } => {
                write!(f, "storage write failed permanently, payload dropped [{key}]")
            }
            Self::RemovedUnrecoverable { key, lost_updates } => {
                write!(f, "entry removed after exhausting cycle retries, {lost_updates} update(s) lost [{key}]")
            }
            Self::NegativeTimeSinceLastAccess { key } => {
                write!(f, "negative time since last access, treated as zero [{key}]")
            }
            Self::NotRetainedDueToMainQueueSize { key } => {
                write!(f, "entry not retained, main queue at size target [{key}]")
            }
            Self::StoragePanic { key } => write!(f, "storage call panicked, treated as failure [{key}]"),
            Self::MessagesMayBeSkippedFor { classifier, severity } => {
                write!(f, "messages may be skipped for {classifier}_{severity}")
            }
            Self::PreviousMessagesSkipped {
                classifier,
                severity,
                skipped,
            } => {
                write!(f, "{skipped} previous message(s) skipped for {classifier}_{severity}")
            }
            Self::NonStandard { text, .. } => f.write_str(text),
        }
    }
}

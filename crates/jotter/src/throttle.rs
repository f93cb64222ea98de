// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Rate-limited log emission, keyed by `(classifier, severity)`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tempo::Clock;

use crate::config::{CacheOptions, to_millis};
use crate::message::{CacheMessage, Severity};
use crate::monitor::Monitor;

/// Destination for emitted log lines.
///
/// Production uses [`TracingSink`]; tests inject a capturing sink.
pub(crate) trait LogSink: Send + Sync + 'static {
    fn emit(&self, cache: &str, severity: Severity, classifier: &str, text: &str);
}

/// Emits through `tracing`, mapping cache severities onto tracing levels.
#[derive(Debug, Default)]
pub(crate) struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, cache: &str, severity: Severity, classifier: &str, text: &str) {
        match severity {
            Severity::Debug => tracing::debug!(cache, classifier, severity = %severity, "{text}"),
            Severity::Info | Severity::ExternalInfo => {
                tracing::info!(cache, classifier, severity = %severity, "{text}");
            }
            Severity::Warn | Severity::ExternalWarn => {
                tracing::warn!(cache, classifier, severity = %severity, "{text}");
            }
            Severity::Error | Severity::ExternalError | Severity::ExternalDataLoss | Severity::Fatal => {
                tracing::error!(cache, classifier, severity = %severity, "{text}");
            }
        }
    }
}

#[derive(Debug, Default)]
struct Window {
    start_millis: u64,
    passed: u32,
    skipped: u64,
}

/// Per-cache throttled logger.
///
/// At most `log_throttle_max_messages_of_type_per_time_interval` messages of
/// one `(classifier, severity)` pair pass per sliding window. The first
/// throttled message of a streak emits a may-be-skipped marker; the first
/// message to pass after the window rolls emits a skipped-count marker.
/// Synthetic markers themselves bypass throttling.
pub(crate) struct ThrottledLog {
    options: Arc<CacheOptions>,
    clock: Clock,
    monitor: Arc<Monitor>,
    sink: Box<dyn LogSink>,
    windows: Mutex<HashMap<(String, Severity), Window>>,
}

impl std::fmt::Debug for ThrottledLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottledLog")
            .field("cache", &self.options.name())
            .field("windows", &self.windows.lock().len())
            .finish_non_exhaustive()
    }
}

impl ThrottledLog {
    pub fn new(options: Arc<CacheOptions>, clock: Clock, monitor: Arc<Monitor>) -> Self {
        Self::with_sink(options, clock, monitor, Box::new(TracingSink))
    }

    pub fn with_sink(options: Arc<CacheOptions>, clock: Clock, monitor: Arc<Monitor>, sink: Box<dyn LogSink>) -> Self {
        Self {
            options,
            clock,
            monitor,
            sink,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Offers a message for emission, applying the throttling contract.
    pub fn log(&self, message: &CacheMessage) {
        let now = self.clock.now_millis();
        let severity = message.severity();
        self.monitor.last_messages.record_offered(severity, now);

        if message.is_throttle_marker() {
            self.dispatch(message);
            return;
        }

        let max_per_window = self.options.log_throttle_max_messages_of_type_per_time_interval();
        if max_per_window == 0 {
            self.dispatch(message);
            return;
        }
        let interval = to_millis(self.options.log_throttle_time_interval());

        let classifier = message.classifier().to_owned();
        let mut pending_marker: Option<CacheMessage> = None;
        let passes;
        {
            let mut windows = self.windows.lock();
            let window = windows.entry((classifier.clone(), severity)).or_insert_with(|| Window {
                start_millis: now,
                passed: 0,
                skipped: 0,
            });

            if now.saturating_sub(window.start_millis) >= interval {
                if window.skipped > 0 {
                    pending_marker = Some(CacheMessage::PreviousMessagesSkipped {
                        classifier: classifier.clone(),
                        severity,
                        skipped: window.skipped,
                    });
                }
                window.start_millis = now;
                window.passed = 0;
                window.skipped = 0;
            }

            if window.passed < max_per_window {
                window.passed += 1;
                passes = true;
            } else {
                window.skipped += 1;
                passes = false;
                if window.skipped == 1 {
                    pending_marker = Some(CacheMessage::MessagesMayBeSkippedFor { classifier, severity });
                }
            }
        }

        if let Some(marker) = pending_marker {
            self.monitor.last_messages.record_offered(marker.severity(), now);
            self.dispatch(&marker);
        }
        if passes {
            self.dispatch(message);
        }
    }

    fn dispatch(&self, message: &CacheMessage) {
        let severity = message.severity();
        let text = message.to_string();
        self.monitor.last_messages.record_logged(severity, text.clone());
        self.sink
            .emit(self.options.name(), severity, message.classifier(), &text);
    }
}

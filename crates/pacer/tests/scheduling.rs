// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Pacer scheduling behavior: delay ladders, bounds, lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pacer::{BoxError, Pacer, PacerOptions, RequestExecutor, SubmitError};
use pretty_assertions::assert_eq;

/// Records every attempt and fails until a scripted per-request attempt
/// count is reached.
struct ScriptedExecutor {
    /// Succeed on this attempt number (1 = first try).
    succeed_on_attempt: u32,
    attempts: Mutex<HashMap<String, Vec<(u32, Instant)>>>,
    hold: Option<Duration>,
}

impl ScriptedExecutor {
    fn new(succeed_on_attempt: u32) -> Arc<Self> {
        Arc::new(Self {
            succeed_on_attempt,
            attempts: Mutex::new(HashMap::new()),
            hold: None,
        })
    }

    fn holding(succeed_on_attempt: u32, hold: Duration) -> Arc<Self> {
        Arc::new(Self {
            succeed_on_attempt,
            attempts: Mutex::new(HashMap::new()),
            hold: Some(hold),
        })
    }

    fn attempt_count(&self, request: &str) -> usize {
        self.attempts.lock().get(request).map_or(0, Vec::len)
    }
}

impl RequestExecutor for ScriptedExecutor {
    type Request = String;

    fn execute(&self, request: &String, attempt: u32) -> Result<(), BoxError> {
        self.attempts
            .lock()
            .entry(request.clone())
            .or_default()
            .push((attempt, Instant::now()));
        if let Some(hold) = self.hold {
            std::thread::sleep(hold);
        }
        if attempt >= self.succeed_on_attempt {
            Ok(())
        } else {
            Err(format!("scripted failure on attempt {attempt}").into())
        }
    }
}

fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    check()
}

#[test]
fn executes_submitted_requests() {
    let executor = ScriptedExecutor::new(1);
    let pacer = Pacer::new(
        Arc::clone(&executor),
        PacerOptions::builder("exec").max_sleep_time(Duration::from_millis(10)).build().unwrap(),
    );
    pacer.start().expect("start");

    for i in 0..5 {
        pacer.submit(format!("req-{i}")).expect("submit");
    }

    assert!(wait_for(Duration::from_secs(2), || pacer.status().succeeded == 5));
    assert_eq!(pacer.in_flight(), 0);

    assert!(pacer.shutdown_for(Duration::from_secs(2)).expect("shutdown"));
    for i in 0..5 {
        assert_eq!(executor.attempt_count(&format!("req-{i}")), 1);
    }
}

#[test]
fn failed_attempts_climb_the_delay_ladder() {
    let executor = ScriptedExecutor::new(3);
    let options = PacerOptions::builder("ladder")
        .max_attempts(4)
        .delays_after_failure(vec![Duration::from_millis(50), Duration::from_millis(100)])
        .early_processing_grace(Duration::from_millis(10))
        .max_sleep_time(Duration::from_millis(10))
        .build()
        .unwrap();
    let pacer = Pacer::new(Arc::clone(&executor), options);
    pacer.start().expect("start");

    let started = Instant::now();
    pacer.submit("climber".to_owned()).expect("submit");

    assert!(wait_for(Duration::from_secs(3), || pacer.status().succeeded == 1));
    let took = started.elapsed();

    // Two failures: delays of ~50ms and ~100ms, each up to 10ms early.
    assert!(took >= Duration::from_millis(120), "took {took:?}");
    assert_eq!(executor.attempt_count("climber"), 3);

    let status = pacer.status();
    assert_eq!(status.failed_attempts, 2);
    assert_eq!(status.delayed_retries, 2);
    assert_eq!(status.failed_final, 0);

    pacer.shutdown_for(Duration::from_secs(2)).expect("shutdown");
}

#[test]
fn attempt_budget_exhaustion_is_final() {
    // Never succeeds; 3 attempts then done.
    let executor = ScriptedExecutor::new(u32::MAX);
    let options = PacerOptions::builder("exhaust")
        .max_attempts(3)
        .delays_after_failure(vec![Duration::from_millis(10)])
        .early_processing_grace(Duration::ZERO)
        .max_sleep_time(Duration::from_millis(10))
        .build()
        .unwrap();
    let pacer = Pacer::new(Arc::clone(&executor), options);
    pacer.start().expect("start");

    pacer.submit("hopeless".to_owned()).expect("submit");

    assert!(wait_for(Duration::from_secs(3), || pacer.status().failed_final == 1));
    assert_eq!(executor.attempt_count("hopeless"), 3);
    assert_eq!(pacer.status().failed_attempts, 3);
    assert_eq!(pacer.in_flight(), 0);

    pacer.shutdown_for(Duration::from_secs(2)).expect("shutdown");
}

#[test]
fn pending_bound_refuses_excess_submissions() {
    // Requests hold their executor thread long enough to keep them in flight.
    let executor = ScriptedExecutor::holding(1, Duration::from_millis(300));
    let options = PacerOptions::builder("bounded")
        .max_pending_requests(2)
        .executor_threads(1)
        .max_sleep_time(Duration::from_millis(10))
        .build()
        .unwrap();
    let pacer = Pacer::new(executor, options);
    pacer.start().expect("start");

    pacer.submit("a".to_owned()).expect("submit");
    pacer.submit("b".to_owned()).expect("submit");
    assert!(matches!(
        pacer.submit("c".to_owned()),
        Err(SubmitError::TooManyPendingRequests { limit: 2 })
    ));

    // Capacity frees up as requests finish.
    assert!(wait_for(Duration::from_secs(3), || pacer.in_flight() == 0));
    pacer.submit("c".to_owned()).expect("submit");

    assert!(pacer.shutdown_for(Duration::from_secs(3)).expect("shutdown"));
}

#[test]
fn grace_window_releases_retries_early() {
    let executor = ScriptedExecutor::new(2);
    // The grace covers the whole delay, so the retry dispatches immediately.
    let options = PacerOptions::builder("grace")
        .max_attempts(2)
        .delays_after_failure(vec![Duration::from_millis(200)])
        .early_processing_grace(Duration::from_millis(200))
        .max_sleep_time(Duration::from_millis(10))
        .build()
        .unwrap();
    let pacer = Pacer::new(Arc::clone(&executor), options);
    pacer.start().expect("start");

    let started = Instant::now();
    pacer.submit("eager".to_owned()).expect("submit");

    assert!(wait_for(Duration::from_secs(2), || pacer.status().succeeded == 1));
    let took = started.elapsed();
    assert!(took < Duration::from_millis(150), "took {took:?}");

    pacer.shutdown_for(Duration::from_secs(2)).expect("shutdown");
}

#[test]
fn lifecycle_gates_submissions() {
    let pacer = Pacer::new(ScriptedExecutor::new(1), PacerOptions::builder("gates").build().unwrap());

    assert!(matches!(pacer.submit("early".to_owned()), Err(SubmitError::NotStarted)));

    pacer.start().expect("start");
    assert!(matches!(pacer.start(), Err(SubmitError::AlreadyStarted)));

    // The worker threads flip their alive flags as they enter their loops.
    assert!(wait_for(Duration::from_secs(1), || {
        let status = pacer.status();
        status.main_thread_alive && status.delay_thread_alive
    }));
    assert!(pacer.status().everything_alive);

    assert!(pacer.shutdown_for(Duration::from_secs(2)).expect("shutdown"));
    assert!(matches!(pacer.submit("late".to_owned()), Err(SubmitError::Shutdown)));
    assert!(matches!(pacer.shutdown_for(Duration::from_secs(1)), Err(SubmitError::Shutdown)));

    let status = pacer.status();
    assert!(!status.everything_alive);
    assert!(!status.main_thread_alive);
    assert!(!status.delay_thread_alive);
}

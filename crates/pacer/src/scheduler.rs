// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The pacer scheduling core: main queue, delay queue, executor pool.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tempo::Clock;
use threadpool::ThreadPool;

use crate::config::{PacerOptions, to_millis};
use crate::error::{BoxError, SubmitError};
use crate::status::PacerStatus;

/// Executes requests on behalf of a [`Pacer`].
///
/// `execute` runs on the executor pool; `attempt` starts at 1. Returning an
/// error schedules a retry against the delay ladder until the attempt budget
/// is exhausted.
pub trait RequestExecutor: Send + Sync + 'static {
    /// The request type this executor handles.
    type Request: Send + 'static;

    /// Performs one attempt of the request.
    ///
    /// # Errors
    ///
    /// Any error counts as a failed attempt and triggers a delayed retry
    /// while attempts remain.
    fn execute(&self, request: &Self::Request, attempt: u32) -> Result<(), BoxError>;
}

impl<T: RequestExecutor> RequestExecutor for Arc<T> {
    type Request = T::Request;

    fn execute(&self, request: &Self::Request, attempt: u32) -> Result<(), BoxError> {
        T::execute(self, request, attempt)
    }
}

const NOT_STARTED: u8 = 0;
const RUNNING: u8 = 1;
const SHUTDOWN_IN_PROGRESS: u8 = 2;
const SHUTDOWN_COMPLETED: u8 = 3;

struct Ticket<R> {
    request: R,
    /// Attempts already made.
    attempt: u32,
    /// Virtual-ms deadline before which the request should not run, minus
    /// the grace window.
    earliest_at_millis: u64,
}

#[derive(Debug, Default)]
struct PacerCounters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed_attempts: AtomicU64,
    failed_final: AtomicU64,
    delayed_retries: AtomicU64,
}

struct PacerShared<E: RequestExecutor> {
    executor: E,
    options: PacerOptions,
    clock: Clock,
    state: AtomicU8,

    main_tx: flume::Sender<Ticket<E::Request>>,
    main_rx: flume::Receiver<Ticket<E::Request>>,
    delay_tx: flume::Sender<Ticket<E::Request>>,
    delay_rx: flume::Receiver<Ticket<E::Request>>,

    pool: ThreadPool,
    in_flight: AtomicUsize,
    delayed_count: AtomicUsize,
    counters: PacerCounters,
    main_alive: AtomicBool,
    delay_alive: AtomicBool,
}

impl<E: RequestExecutor> PacerShared<E> {
    fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    fn is_terminated(&self) -> bool {
        self.state() == SHUTDOWN_COMPLETED
    }

    fn max_sleep(&self) -> Duration {
        self.options.max_sleep_time()
    }

    /// Main-queue loop: dispatches due tickets, parks early ones.
    fn main_loop(self: Arc<Self>) {
        self.main_alive.store(true, Ordering::Relaxed);
        loop {
            if self.is_terminated() {
                break;
            }
            match self.main_rx.recv_timeout(self.max_sleep()) {
                Ok(ticket) => {
                    let grace = to_millis(self.options.early_processing_grace());
                    let now = self.clock.now_millis();
                    if now.saturating_add(grace) >= ticket.earliest_at_millis {
                        Self::dispatch(&self, ticket);
                    } else {
                        let _ = self.delay_tx.send(ticket);
                    }
                }
                Err(flume::RecvTimeoutError::Timeout) => {}
                Err(flume::RecvTimeoutError::Disconnected) => break,
            }
        }
        self.main_alive.store(false, Ordering::Relaxed);
    }

    /// Delay-queue loop: holds not-yet-due tickets and releases them back to
    /// the main queue once inside the grace window.
    fn delay_loop(self: Arc<Self>) {
        self.delay_alive.store(true, Ordering::Relaxed);
        let mut parked: Vec<Ticket<E::Request>> = Vec::new();

        loop {
            if self.is_terminated() {
                break;
            }

            // Sleep until the earliest parked deadline, bounded by the sleep
            // cap so shutdown stays responsive.
            let grace = to_millis(self.options.early_processing_grace());
            let now = self.clock.now_millis();
            let next_due = parked
                .iter()
                .map(|ticket| ticket.earliest_at_millis.saturating_sub(grace))
                .min();
            let poll = match next_due {
                Some(due) if due > now => Duration::from_millis((due - now).min(to_millis(self.max_sleep()))),
                Some(_) => Duration::ZERO,
                None => self.max_sleep(),
            };

            match self.delay_rx.recv_timeout(poll) {
                Ok(ticket) => parked.push(ticket),
                Err(flume::RecvTimeoutError::Timeout) => {}
                Err(flume::RecvTimeoutError::Disconnected) => break,
            }
            while let Ok(ticket) = self.delay_rx.try_recv() {
                parked.push(ticket);
            }

            let now = self.clock.now_millis();
            let mut index = 0;
            while index < parked.len() {
                if parked[index].earliest_at_millis.saturating_sub(grace) <= now {
                    let ticket = parked.swap_remove(index);
                    let _ = self.main_tx.send(ticket);
                } else {
                    index += 1;
                }
            }
            self.delayed_count.store(parked.len(), Ordering::Relaxed);
        }

        self.delayed_count.store(0, Ordering::Relaxed);
        self.delay_alive.store(false, Ordering::Relaxed);
    }

    fn dispatch(shared: &Arc<Self>, ticket: Ticket<E::Request>) {
        let worker = Arc::clone(shared);
        shared.pool.execute(move || worker.run_attempt(ticket));
    }

    fn run_attempt(&self, mut ticket: Ticket<E::Request>) {
        let attempt = ticket.attempt + 1;
        let outcome = catch_unwind(AssertUnwindSafe(|| self.executor.execute(&ticket.request, attempt)));
        let failure: Option<String> = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(error.to_string()),
            Err(_) => Some("request executor panicked".to_owned()),
        };

        match failure {
            None => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
            }
            Some(cause) => {
                self.counters.failed_attempts.fetch_add(1, Ordering::Relaxed);
                if attempt >= self.options.max_attempts() {
                    self.counters.failed_final.fetch_add(1, Ordering::Relaxed);
                    self.in_flight.fetch_sub(1, Ordering::AcqRel);
                    tracing::warn!(
                        pacer = self.options.name(),
                        attempt,
                        cause,
                        "request failed permanently, attempt budget exhausted"
                    );
                } else {
                    let delay = self.options.delay_after_failure(attempt - 1);
                    ticket.attempt = attempt;
                    ticket.earliest_at_millis = self.clock.now_millis().saturating_add(to_millis(delay));
                    self.counters.delayed_retries.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        pacer = self.options.name(),
                        attempt,
                        delay_millis = to_millis(delay),
                        cause,
                        "request attempt failed, retry scheduled"
                    );
                    let _ = self.delay_tx.send(ticket);
                }
            }
        }
    }
}

/// A retry-and-rate-limit request scheduler.
///
/// Admits up to `max_pending_requests` requests at a time and runs them on a
/// fixed executor pool. Failed attempts are retried after the configured
/// delay ladder; a request that exhausts `max_attempts` is dropped and
/// counted. Delayed requests may be dispatched up to
/// `early_processing_grace` before their deadline.
pub struct Pacer<E: RequestExecutor> {
    shared: Arc<PacerShared<E>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl<E: RequestExecutor> std::fmt::Debug for Pacer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacer")
            .field("name", &self.shared.options.name())
            .field("in_flight", &self.shared.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<E: RequestExecutor> Drop for Pacer<E> {
    fn drop(&mut self) {
        // Worker threads must not outlive the pacer; they observe the
        // terminal state within one sleep bound.
        self.shared.state.store(SHUTDOWN_COMPLETED, Ordering::Release);
    }
}

impl<E: RequestExecutor> Pacer<E> {
    /// Creates a pacer over the given executor and options, using the system
    /// clock.
    #[must_use]
    pub fn new(executor: E, options: PacerOptions) -> Self {
        Self::with_clock(executor, options, Clock::new())
    }

    /// Creates a pacer with an explicit clock.
    #[must_use]
    pub fn with_clock(executor: E, options: PacerOptions, clock: Clock) -> Self {
        let (main_tx, main_rx) = flume::unbounded();
        let (delay_tx, delay_rx) = flume::unbounded();
        let pool = threadpool::Builder::new()
            .num_threads(options.executor_threads())
            .thread_name(format!("{}-executor", options.name()))
            .build();

        Self {
            shared: Arc::new(PacerShared {
                executor,
                options,
                clock,
                state: AtomicU8::new(NOT_STARTED),
                main_tx,
                main_rx,
                delay_tx,
                delay_rx,
                pool,
                in_flight: AtomicUsize::new(0),
                delayed_count: AtomicUsize::new(0),
                counters: PacerCounters::default(),
                main_alive: AtomicBool::new(false),
                delay_alive: AtomicBool::new(false),
            }),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// The pacer's configuration.
    #[must_use]
    pub fn options(&self) -> &PacerOptions {
        &self.shared.options
    }

    /// Starts the main-queue and delay-queue threads.
    ///
    /// # Errors
    ///
    /// Fails unless the pacer has never been started.
    pub fn start(&self) -> Result<(), SubmitError> {
        if self
            .shared
            .state
            .compare_exchange(NOT_STARTED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(match self.shared.state() {
                SHUTDOWN_IN_PROGRESS | SHUTDOWN_COMPLETED => SubmitError::Shutdown,
                _ => SubmitError::AlreadyStarted,
            });
        }

        let name = self.shared.options.name().to_owned();
        let mut threads = self.threads.lock();

        let shared = Arc::clone(&self.shared);
        threads.push(
            std::thread::Builder::new()
                .name(format!("{name}-main-queue"))
                .spawn(move || shared.main_loop())
                .expect("failed to spawn pacer main-queue thread"),
        );
        let shared = Arc::clone(&self.shared);
        threads.push(
            std::thread::Builder::new()
                .name(format!("{name}-delay-queue"))
                .spawn(move || shared.delay_loop())
                .expect("failed to spawn pacer delay-queue thread"),
        );
        Ok(())
    }

    /// Submits a request for execution.
    ///
    /// # Errors
    ///
    /// Fails when the pacer is not running or the pending-request bound is
    /// reached.
    pub fn submit(&self, request: E::Request) -> Result<(), SubmitError> {
        match self.shared.state() {
            RUNNING => {}
            NOT_STARTED => return Err(SubmitError::NotStarted),
            _ => return Err(SubmitError::Shutdown),
        }

        let limit = self.shared.options.max_pending_requests();
        if self
            .shared
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < limit).then(|| current + 1)
            })
            .is_err()
        {
            return Err(SubmitError::TooManyPendingRequests { limit });
        }

        self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
        let _ = self.shared.main_tx.send(Ticket {
            request,
            attempt: 0,
            earliest_at_millis: self.shared.clock.now_millis(),
        });
        Ok(())
    }

    /// Requests admitted but not yet done or failed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Drains in-flight work and terminates the pacer threads.
    ///
    /// Returns `true` when everything finished and both threads terminated
    /// within the budget.
    ///
    /// # Errors
    ///
    /// Raises a shutdown error when already shut down.
    pub fn shutdown_for(&self, timeout: Duration) -> Result<bool, SubmitError> {
        loop {
            let current = self.shared.state();
            if current == SHUTDOWN_IN_PROGRESS || current == SHUTDOWN_COMPLETED {
                return Err(SubmitError::Shutdown);
            }
            if self
                .shared
                .state
                .compare_exchange(current, SHUTDOWN_IN_PROGRESS, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }

        let deadline = self.shared.clock.now_millis().saturating_add(to_millis(timeout));
        let drained = loop {
            if self.shared.in_flight.load(Ordering::Acquire) == 0 {
                break true;
            }
            let now = self.shared.clock.now_millis();
            if now >= deadline {
                break false;
            }
            let slice = (deadline - now).min(5).max(1);
            self.shared.clock.sleep(Duration::from_millis(slice));
        };

        self.shared.state.store(SHUTDOWN_COMPLETED, Ordering::Release);

        let grace = self.shared.max_sleep().saturating_mul(4);
        let join_by = std::time::Instant::now() + grace;
        let mut all_joined = true;
        for handle in self.threads.lock().drain(..) {
            while !handle.is_finished() && std::time::Instant::now() < join_by {
                std::thread::sleep(Duration::from_millis(1));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                all_joined = false;
            }
        }

        Ok(drained && all_joined)
    }

    /// Produces a status snapshot.
    #[must_use]
    pub fn status(&self) -> PacerStatus {
        let shared = &self.shared;
        let main_thread_alive = shared.main_alive.load(Ordering::Relaxed);
        let delay_thread_alive = shared.delay_alive.load(Ordering::Relaxed);
        let executor_pool_alive = shared.pool.max_count() > 0;

        PacerStatus {
            everything_alive: shared.state() == RUNNING
                && main_thread_alive
                && delay_thread_alive
                && executor_pool_alive,
            main_thread_alive,
            delay_thread_alive,
            executor_pool_alive,
            queue_size: shared.main_rx.len(),
            delayed_count: shared.delayed_count.load(Ordering::Relaxed),
            in_flight: shared.in_flight.load(Ordering::Acquire),
            submitted: shared.counters.submitted.load(Ordering::Relaxed),
            succeeded: shared.counters.succeeded.load(Ordering::Relaxed),
            failed_attempts: shared.counters.failed_attempts.load(Ordering::Relaxed),
            failed_final: shared.counters.failed_final.load(Ordering::Relaxed),
            delayed_retries: shared.counters.delayed_retries.load(Ordering::Relaxed),
        }
    }
}

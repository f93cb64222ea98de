// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Optional thread pools for storage I/O.

use threadpool::ThreadPool;

use crate::config::PoolSize;

/// Executor for storage calls issued by a queue worker.
///
/// Configured from a `(min, max)` pair: `(-1, -1)` disables the pool and the
/// storage call runs inline on the queue worker thread; otherwise the pool
/// starts at `min` threads and grows by one, up to `max`, whenever the
/// backlog exceeds the current thread count.
pub(crate) enum IoPool {
    Inline,
    Pool { pool: ThreadPool, max_threads: usize },
}

impl std::fmt::Debug for IoPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline => f.write_str("IoPool::Inline"),
            Self::Pool { pool, max_threads } => f
                .debug_struct("IoPool")
                .field("threads", &pool.max_count())
                .field("max_threads", max_threads)
                .finish(),
        }
    }
}

impl IoPool {
    pub fn from_size(size: PoolSize, thread_name: &str) -> Self {
        if size.is_disabled() {
            return Self::Inline;
        }
        let min = usize::try_from(size.min).unwrap_or(1).max(1);
        let max = usize::try_from(size.max).unwrap_or(min).max(min);
        Self::Pool {
            pool: threadpool::Builder::new()
                .num_threads(min)
                .thread_name(thread_name.to_owned())
                .build(),
            max_threads: max,
        }
    }

    /// Runs `job` inline or on the pool, growing the pool first when it is
    /// overloaded.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        match self {
            Self::Inline => job(),
            Self::Pool { pool, max_threads } => {
                let backlog = pool.queued_count() + pool.active_count();
                let current = pool.max_count();
                if backlog >= current && current < *max_threads {
                    pool.clone().set_num_threads(current + 1);
                }
                pool.execute(job);
            }
        }
    }

    /// Whether the pool can still run jobs. Inline execution is always alive.
    pub fn is_alive(&self) -> bool {
        match self {
            Self::Inline => true,
            Self::Pool { pool, .. } => pool.max_count() > 0,
        }
    }

    /// Blocks until all queued jobs have finished.
    pub fn join(&self) {
        if let Self::Pool { pool, .. } = self {
            pool.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[test]
    fn inline_runs_on_the_calling_thread() {
        let pool = IoPool::from_size(PoolSize::disabled(), "test-pool");
        let caller = std::thread::current().id();

        let observed = Arc::new(parking_lot::Mutex::new(None));
        let slot = Arc::clone(&observed);
        pool.execute(move || {
            *slot.lock() = Some(std::thread::current().id());
        });

        assert_eq!(*observed.lock(), Some(caller));
        assert!(pool.is_alive());
    }

    #[test]
    fn pool_executes_all_jobs() {
        let pool = IoPool::from_size(PoolSize::bounded(1, 2), "test-pool");
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..16 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                std::thread::sleep(Duration::from_millis(1));
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        pool.join();

        assert_eq!(counter.load(Ordering::Relaxed), 16);
    }

    #[test]
    fn pool_grows_under_backlog_up_to_max() {
        let pool = IoPool::from_size(PoolSize::bounded(1, 3), "test-pool");

        for _ in 0..32 {
            pool.execute(|| std::thread::sleep(Duration::from_millis(2)));
        }
        if let IoPool::Pool { pool, max_threads } = &pool {
            assert!(pool.max_count() <= *max_threads);
            assert!(pool.max_count() > 1);
        } else {
            panic!("expected a real pool");
        }
        pool.join();
    }
}

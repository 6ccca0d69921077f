//! Where fired actions run.
//!
//! The dispatcher hands each due action to an [`Executor`]. Two are
//! provided:
//!
//! - [`Inline`] runs the action on the calling thread. No extra threads, but
//!   a slow action delays every task behind it.
//! - [`ThreadPool`] runs actions on a fixed set of named workers fed by a
//!   bounded lock-free queue. When the queue is full the pool either blocks
//!   the submitter or rejects the job, per [`Backpressure`].
//!
//! The pool never grows and never spawns a thread per job.

use crate::config::{Backpressure, PoolConfig};
use crate::error::{ActionFailure, Error, ErrorKind, ExecutorError};
use crate::runtime::completion::{CompletionHandle, completion};
use crate::sync::Gate;
use crate::tracing_compat::{debug, warn};
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// A unit of work for an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs handed over by the dispatcher.
pub trait Executor: Send + Sync {
    /// Runs or enqueues `job`.
    ///
    /// A job that is rejected is dropped without running.
    fn execute(&self, job: Job) -> Result<(), ExecutorError>;

    /// Stops accepting jobs, finishes the ones already accepted, and releases
    /// any threads. Idempotent.
    fn shutdown(&self);
}

/// Runs each job immediately on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl Executor for Inline {
    fn execute(&self, job: Job) -> Result<(), ExecutorError> {
        job();
        Ok(())
    }

    fn shutdown(&self) {}
}

struct PoolShared {
    queue: ArrayQueue<Job>,
    closed: AtomicBool,
    backpressure: Backpressure,
    /// Number of workers parked waiting for a job.
    idle: Gate<usize>,
    /// Number of submitters parked waiting for queue space.
    blocked: Gate<usize>,
}

impl PoolShared {
    fn push(&self, job: Job) -> Result<(), ExecutorError> {
        let mut job = job;
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(ExecutorError::ShutDown);
            }
            match self.queue.push(job) {
                Ok(()) => {
                    self.wake_worker();
                    return Ok(());
                }
                Err(returned) => job = returned,
            }
            if self.backpressure == Backpressure::Reject {
                return Err(ExecutorError::Saturated {
                    capacity: self.queue.capacity(),
                });
            }
            let mut blocked = self.blocked.lock();
            if self.queue.is_full() && !self.closed.load(Ordering::Acquire) {
                *blocked += 1;
                self.blocked.wait(&mut blocked);
                *blocked -= 1;
            }
        }
    }

    fn wake_worker(&self) {
        let idle = self.idle.lock();
        if *idle > 0 {
            self.idle.notify_one();
        }
    }

    fn wake_submitter(&self) {
        let blocked = self.blocked.lock();
        if *blocked > 0 {
            self.blocked.notify_one();
        }
    }

    /// Next job, or `None` once closed and empty.
    fn next_job(&self) -> Option<Job> {
        loop {
            if let Some(job) = self.queue.pop() {
                self.wake_submitter();
                return Some(job);
            }
            let mut idle = self.idle.lock();
            if !self.queue.is_empty() {
                continue;
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            *idle += 1;
            self.idle.wait(&mut idle);
            *idle -= 1;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        {
            let _idle = self.idle.lock();
            self.idle.notify_all();
        }
        let _blocked = self.blocked.lock();
        self.blocked.notify_all();
    }
}

fn worker_loop(shared: &PoolShared) {
    while let Some(job) = shared.next_job() {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("pool job panicked");
        }
    }
}

/// A fixed-size pool of named worker threads.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    config: PoolConfig,
}

impl ThreadPool {
    /// Starts `config.workers` threads.
    pub fn new(config: PoolConfig) -> Result<Self, Error> {
        config.validate()?;
        let shared = Arc::new(PoolShared {
            queue: ArrayQueue::new(config.queue_capacity),
            closed: AtomicBool::new(false),
            backpressure: config.backpressure,
            idle: Gate::new(0),
            blocked: Gate::new(0),
        });

        let mut workers = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("{}-{index}", config.thread_name))
                .spawn(move || worker_loop(&worker_shared));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    shared.close();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(Error::new(ErrorKind::Spawn)
                        .with_message(format!("pool worker {index}"))
                        .with_source(err));
                }
            }
        }

        debug!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "thread pool started"
        );
        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            config,
        })
    }

    /// Queues `f` and returns a handle to its result.
    ///
    /// A panic inside `f` is delivered through the handle, never to the
    /// submitter.
    pub fn submit<F, T>(&self, f: F) -> Result<CompletionHandle<T>, ExecutorError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (completer, handle) = completion();
        let job: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(f))
                .map_err(|payload| ActionFailure::from_panic(payload.as_ref()));
            completer.complete(outcome);
        });
        self.shared.push(job)?;
        Ok(handle)
    }

    /// Number of queued jobs not yet picked up by a worker.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Returns the configuration the pool was started with.
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Returns true once shutdown has begun.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl Executor for ThreadPool {
    fn execute(&self, job: Job) -> Result<(), ExecutorError> {
        self.shared.push(job)
    }

    fn shutdown(&self) {
        self.shared.close();
        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }
        let current = thread::current().id();
        let count = workers.len();
        for handle in workers {
            // A job that shuts down its own pool cannot join itself; its
            // worker exits on its own once the queue is empty.
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
        debug!(workers = count, "thread pool stopped");
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        Executor::shutdown(self);
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.config.workers)
            .field("queued", &self.queued())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    fn pool(workers: usize, capacity: usize, backpressure: Backpressure) -> ThreadPool {
        ThreadPool::new(
            PoolConfig::with_workers(workers)
                .queue_capacity(capacity)
                .backpressure(backpressure)
                .thread_name("test-worker"),
        )
        .unwrap()
    }

    #[test]
    fn inline_runs_on_caller() {
        let caller = thread::current().id();
        let (tx, rx) = mpsc::channel();
        Inline
            .execute(Box::new(move || tx.send(thread::current().id()).unwrap()))
            .unwrap();
        assert_eq!(rx.recv().unwrap(), caller);
    }

    #[test]
    fn submit_returns_value() {
        let pool = pool(2, 8, Backpressure::Block);
        let handle = pool.submit(|| 6 * 7).unwrap();
        assert_eq!(handle.wait().unwrap(), 42);
    }

    #[test]
    fn workers_are_named() {
        let pool = pool(1, 4, Backpressure::Block);
        let name = pool
            .submit(|| thread::current().name().map(str::to_owned))
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(name.as_deref(), Some("test-worker-0"));
    }

    #[test]
    fn panic_surfaces_on_handle_only() {
        fn explode() -> u32 {
            panic!("worker boom");
        }
        let pool = pool(1, 4, Backpressure::Block);
        let failure = pool.submit(explode).unwrap().wait().unwrap_err();
        assert_eq!(failure.kind(), &FailureKind::Panicked("worker boom".into()));

        // The worker survived.
        assert_eq!(pool.submit(|| 1).unwrap().wait().unwrap(), 1);
    }

    #[test]
    fn reject_policy_reports_saturation() {
        let pool = pool(1, 1, Backpressure::Reject);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel();

        let running = pool
            .submit(move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
            .unwrap();
        started_rx.recv().unwrap();

        // Worker busy: one slot in the queue, then saturation.
        let queued = pool.submit(|| ()).unwrap();
        let err = pool.submit(|| ()).unwrap_err();
        assert_eq!(err, ExecutorError::Saturated { capacity: 1 });

        release_tx.send(()).unwrap();
        running.wait().unwrap();
        queued.wait().unwrap();
    }

    #[test]
    fn block_policy_waits_for_space() {
        let pool = Arc::new(pool(1, 1, Backpressure::Block));
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel();
        let _running = pool
            .submit(move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
            .unwrap();
        started_rx.recv().unwrap();
        let _queued = pool.submit(|| ()).unwrap();

        let submitter_pool = Arc::clone(&pool);
        let submitter = thread::spawn(move || submitter_pool.submit(|| 5).unwrap().wait());
        thread::sleep(Duration::from_millis(20));
        assert!(!submitter.is_finished());

        release_tx.send(()).unwrap();
        assert_eq!(submitter.join().unwrap().unwrap(), 5);
    }

    #[test]
    fn shutdown_drains_queue() {
        let pool = pool(2, 64, Backpressure::Block);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            pool.execute(Box::new(move || {
                thread::sleep(Duration::from_micros(200));
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert!(pool.is_shut_down());
        assert_eq!(pool.submit(|| ()).unwrap_err(), ExecutorError::ShutDown);
        // Idempotent.
        pool.shutdown();
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = ThreadPool::new(PoolConfig::with_workers(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}

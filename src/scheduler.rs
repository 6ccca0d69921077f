//! The public scheduler service.
//!
//! A [`Scheduler`] owns one dispatcher thread and, depending on its
//! configuration, a worker pool. It is an ordinary owned value: dropping it
//! shuts the service down, and there is no process-wide instance.
//!
//! ```no_run
//! use tickless::Scheduler;
//!
//! let scheduler = Scheduler::new()?;
//! scheduler.schedule(500, || println!("half a second later"))?;
//! let report = scheduler.shutdown();
//! assert_eq!(report.dropped(), 1);
//! # Ok::<(), tickless::Error>(())
//! ```
//!
//! Actions that need to schedule follow-up work receive a
//! [`SchedulerHandle`], which refers to the scheduler weakly and so never
//! keeps it alive.

use crate::config::{ExecutionMode, PendingPolicy, SchedulerConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::observability::{ErrorSink, MetricsSnapshot, SharedSink};
use crate::runtime::dispatcher::{self, Action, Core, DispatcherState};
use crate::runtime::executor::{Executor, Inline, ThreadPool};
use crate::tracing_compat::{debug, error, warn};
use crate::types::{Time, TimerId};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

fn delay_from_millis(delay_ms: i64) -> Result<Duration> {
    u64::try_from(delay_ms)
        .map(Duration::from_millis)
        .map_err(|_| Error::invalid_delay(delay_ms))
}

fn schedule_on(core: &Arc<Core>, delay: Duration, action: Action) -> Result<TimerHandle> {
    let (id, deadline) = core.insert(delay, action)?;
    Ok(TimerHandle {
        id,
        deadline,
        core: Arc::downgrade(core),
    })
}

fn owns(core: &Arc<Core>, timer: &TimerHandle) -> bool {
    std::ptr::eq(timer.core.as_ptr(), Arc::as_ptr(core))
}

/// What happened to pending tasks at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    dropped: usize,
    drained: usize,
    joined: bool,
}

impl ShutdownReport {
    pub(crate) const fn new(dropped: usize, drained: usize) -> Self {
        Self {
            dropped,
            drained,
            joined: false,
        }
    }

    const fn with_joined(mut self, joined: bool) -> Self {
        self.joined = joined;
        self
    }

    /// Tasks discarded without running ([`PendingPolicy::Drop`]).
    #[must_use]
    pub const fn dropped(&self) -> usize {
        self.dropped
    }

    /// Tasks fired early instead of at their deadline
    /// ([`PendingPolicy::Drain`]).
    #[must_use]
    pub const fn drained(&self) -> usize {
        self.drained
    }

    /// True if the dispatcher thread was joined before returning.
    ///
    /// False when shutdown ran on the dispatcher thread itself, when the
    /// configured shutdown timeout elapsed, or when another caller had
    /// already joined it.
    #[must_use]
    pub const fn dispatcher_joined(&self) -> bool {
        self.joined
    }
}

/// A delayed-execution task scheduler.
pub struct Scheduler {
    core: Arc<Core>,
    dispatcher: Option<JoinHandle<()>>,
    shutdown_timeout: Option<Duration>,
}

impl Scheduler {
    /// Starts a scheduler with the default configuration: inline execution
    /// and the drop policy for pending tasks.
    pub fn new() -> Result<Self> {
        Self::with_config(SchedulerConfig::default())
    }

    /// Starts a scheduler with `config`.
    pub fn with_config(config: SchedulerConfig) -> Result<Self> {
        SchedulerBuilder::new().config(config).build()
    }

    /// Returns a builder.
    #[must_use]
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// Runs `action` no earlier than `delay_ms` milliseconds from now.
    ///
    /// A delay of zero makes the task due immediately. A negative delay is
    /// rejected with [`ErrorKind::InvalidDelay`] and nothing is scheduled.
    pub fn schedule<F>(&self, delay_ms: i64, action: F) -> Result<TimerHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_with_handle(delay_ms, move |_| action())
    }

    /// Runs `action` no earlier than `delay` from now.
    pub fn schedule_after<F>(&self, delay: Duration, action: F) -> Result<TimerHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        schedule_on(&self.core, delay, Box::new(move |_: &SchedulerHandle| action()))
    }

    /// Like [`schedule`](Self::schedule), passing the action a handle it can
    /// use to schedule more work.
    pub fn schedule_with_handle<F>(&self, delay_ms: i64, action: F) -> Result<TimerHandle>
    where
        F: FnOnce(&SchedulerHandle) + Send + 'static,
    {
        let delay = delay_from_millis(delay_ms)?;
        schedule_on(&self.core, delay, Box::new(action))
    }

    /// Cancels a pending task. Returns false if it already fired, was
    /// already cancelled, belongs to another scheduler, or shutdown has
    /// begun.
    pub fn cancel(&self, timer: &TimerHandle) -> bool {
        owns(&self.core, timer) && self.core.cancel(timer.id)
    }

    /// Number of tasks waiting for their deadline.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.core.pending()
    }

    /// Current counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.core.metrics()
    }

    /// What the dispatcher thread is doing.
    #[must_use]
    pub fn dispatcher_state(&self) -> DispatcherState {
        self.core.dispatcher_state()
    }

    /// Current time on this scheduler's clock, comparable with
    /// [`TimerHandle::deadline`].
    #[must_use]
    pub fn now(&self) -> Time {
        self.core.now()
    }

    /// Returns a non-owning handle.
    #[must_use]
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::from_core(&self.core)
    }

    /// Stops the dispatcher and settles pending tasks per the configured
    /// [`PendingPolicy`].
    ///
    /// Blocks until the dispatcher exits (bounded by the configured shutdown
    /// timeout) and any worker pool has finished its queue. Called from
    /// inside an inline action, it only signals the stop; the dispatcher
    /// exits once the action returns.
    pub fn shutdown(mut self) -> ShutdownReport {
        self.stop()
    }

    fn stop(&mut self) -> ShutdownReport {
        let report = self.core.begin_shutdown();
        let Some(dispatcher) = self.dispatcher.take() else {
            return report;
        };
        if dispatcher.thread().id() == thread::current().id() {
            debug!("shutdown on the dispatcher thread; not joining");
            return report;
        }
        if !self.core.wait_exited(self.shutdown_timeout) {
            warn!(
                timeout = ?self.shutdown_timeout,
                "dispatcher did not stop in time; detaching"
            );
            return report;
        }
        if dispatcher.join().is_err() {
            error!("dispatcher thread panicked");
        }
        self.core.executor().shutdown();
        report.with_joined(true)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.dispatcher.is_some() {
            let _ = self.stop();
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .field("dispatcher", &self.dispatcher_state())
            .finish()
    }
}

/// Builder for [`Scheduler`].
#[derive(Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    sink: Option<SharedSink>,
    executor: Option<Arc<dyn Executor>>,
}

impl SchedulerBuilder {
    /// Starts from the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the fate of pending tasks at shutdown.
    #[must_use]
    pub fn pending_policy(mut self, policy: PendingPolicy) -> Self {
        self.config.pending_policy = policy;
        self
    }

    /// Selects inline or pool execution.
    #[must_use]
    pub fn execution(mut self, execution: ExecutionMode) -> Self {
        self.config.execution = execution;
        self
    }

    /// Names the dispatcher thread.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Bounds how long shutdown waits for the dispatcher.
    #[must_use]
    pub const fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = Some(timeout);
        self
    }

    /// Sets where action failures are reported. Defaults to
    /// [`LogSink`](crate::observability::LogSink).
    #[must_use]
    pub fn error_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.sink = Some(SharedSink::new(sink));
        self
    }

    /// Uses a caller-supplied executor, overriding the execution mode.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Validates the configuration and starts the dispatcher.
    pub fn build(self) -> Result<Scheduler> {
        let Self {
            config,
            sink,
            executor,
        } = self;
        config.validate()?;

        let executor: Arc<dyn Executor> = match (executor, &config.execution) {
            (Some(executor), _) => executor,
            (None, ExecutionMode::Inline) => Arc::new(Inline),
            (None, ExecutionMode::Pool(pool)) => Arc::new(ThreadPool::new(pool.clone())?),
        };
        let core = Arc::new(Core::new(
            executor,
            sink.unwrap_or_default(),
            config.pending_policy,
        ));

        let thread_core = Arc::clone(&core);
        let dispatcher = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || dispatcher::run(&thread_core))
            .map_err(|err| {
                Error::new(ErrorKind::Spawn)
                    .with_message("dispatcher thread")
                    .with_source(err)
            })?;

        debug!(
            thread = %config.thread_name,
            policy = ?config.pending_policy,
            "scheduler started"
        );
        Ok(Scheduler {
            core,
            dispatcher: Some(dispatcher),
            shutdown_timeout: config.shutdown_timeout,
        })
    }
}

impl fmt::Debug for SchedulerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerBuilder")
            .field("config", &self.config)
            .field("custom_sink", &self.sink.is_some())
            .field("custom_executor", &self.executor.is_some())
            .finish()
    }
}

/// A non-owning reference to a [`Scheduler`].
///
/// Every scheduled action receives one. Operations fail with
/// [`ErrorKind::ShutDown`] once the scheduler has stopped or been dropped.
#[derive(Clone)]
pub struct SchedulerHandle {
    core: Weak<Core>,
}

impl SchedulerHandle {
    pub(crate) fn from_core(core: &Arc<Core>) -> Self {
        Self {
            core: Arc::downgrade(core),
        }
    }

    fn core(&self) -> Result<Arc<Core>> {
        self.core.upgrade().ok_or_else(Error::shut_down)
    }

    /// See [`Scheduler::schedule`].
    pub fn schedule<F>(&self, delay_ms: i64, action: F) -> Result<TimerHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_with_handle(delay_ms, move |_| action())
    }

    /// See [`Scheduler::schedule_after`].
    pub fn schedule_after<F>(&self, delay: Duration, action: F) -> Result<TimerHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        schedule_on(
            &self.core()?,
            delay,
            Box::new(move |_: &SchedulerHandle| action()),
        )
    }

    /// See [`Scheduler::schedule_with_handle`].
    pub fn schedule_with_handle<F>(&self, delay_ms: i64, action: F) -> Result<TimerHandle>
    where
        F: FnOnce(&SchedulerHandle) + Send + 'static,
    {
        let delay = delay_from_millis(delay_ms)?;
        schedule_on(&self.core()?, delay, Box::new(action))
    }

    /// See [`Scheduler::cancel`].
    pub fn cancel(&self, timer: &TimerHandle) -> bool {
        self.core
            .upgrade()
            .is_some_and(|core| owns(&core, timer) && core.cancel(timer.id))
    }

    /// Pending tasks, or zero once the scheduler is gone.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.core.upgrade().map_or(0, |core| core.pending())
    }

    /// See [`Scheduler::now`]. `None` once the scheduler is gone.
    #[must_use]
    pub fn now(&self) -> Option<Time> {
        self.core.upgrade().map(|core| core.now())
    }

    /// True once shutdown has begun or the scheduler was dropped.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.core.upgrade().is_none_or(|core| core.is_stopping())
    }

    /// Signals the dispatcher to stop without waiting for it.
    ///
    /// Pending tasks are settled per the pending policy exactly as in
    /// [`Scheduler::shutdown`]. Returns `None` if the scheduler is gone.
    pub fn request_shutdown(&self) -> Option<ShutdownReport> {
        self.core.upgrade().map(|core| core.begin_shutdown())
    }
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("alive", &(self.core.strong_count() > 0))
            .finish()
    }
}

/// Refers to one scheduled task.
#[derive(Clone)]
pub struct TimerHandle {
    id: TimerId,
    deadline: Time,
    core: Weak<Core>,
}

impl TimerHandle {
    /// The task's id.
    #[must_use]
    pub const fn id(&self) -> TimerId {
        self.id
    }

    /// When the task becomes due, on its scheduler's clock.
    #[must_use]
    pub const fn deadline(&self) -> Time {
        self.deadline
    }

    /// Time left until the deadline; zero once due.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.core
            .upgrade()
            .map_or(Duration::ZERO, |core| self.deadline.duration_since(core.now()))
    }

    /// True while the task is waiting for its deadline.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.core
            .upgrade()
            .is_some_and(|core| core.is_pending(self.id))
    }

    /// Cancels the task. See [`Scheduler::cancel`].
    pub fn cancel(&self) -> bool {
        self.core
            .upgrade()
            .is_some_and(|core| core.cancel(self.id))
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.id)
            .field("deadline", &self.deadline)
            .finish()
    }
}

//! The dispatcher: one thread that sleeps until the earliest deadline and
//! fires due tasks.
//!
//! # State machine
//!
//! ```text
//!            insert                      deadline reached
//!   Idle ────────────────▶ Waiting ───────────────────────▶ Firing
//!    ▲                      │  ▲                              │
//!    │                      └──┘ wake, nothing due yet        │
//!    └────────────── queue empty ◀─────────── no more due ────┘
//!
//!   any state ── stop observed ──▶ Stopped
//! ```
//!
//! Every wake, timed or notified, re-evaluates the stop flag first and then
//! the earliest deadline. Tasks are popped one at a time and the lock is
//! released while each one is handed to the executor, so `schedule` and
//! `cancel` never wait behind a running action and shutdown is observed
//! between tasks.

use crate::config::PendingPolicy;
use crate::error::{ActionFailure, Error, FailureKind, Result};
use crate::observability::{MetricsSnapshot, SchedulerMetrics, SharedSink};
use crate::runtime::executor::{Executor, Job};
use crate::runtime::timer::{Task, TimerQueue};
use crate::scheduler::{SchedulerHandle, ShutdownReport};
use crate::sync::Gate;
use crate::time::Clock;
use crate::tracing_compat::{debug, error, info, trace};
use crate::types::{Time, TimerId};
use parking_lot::MutexGuard;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// A scheduled action. Receives a non-owning handle to its scheduler.
pub(crate) type Action = Box<dyn FnOnce(&SchedulerHandle) + Send + 'static>;

/// What the dispatcher thread is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DispatcherState {
    /// No pending tasks; blocked until something is scheduled.
    Idle = 0,
    /// Blocked until the earliest deadline or an earlier insert.
    Waiting = 1,
    /// Handing due tasks to the executor.
    Firing = 2,
    /// The loop has exited.
    Stopped = 3,
}

impl DispatcherState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Waiting,
            2 => Self::Firing,
            _ => Self::Stopped,
        }
    }

    /// Returns the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Firing => "firing",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything guarded by the gate.
struct SchedulerState {
    queue: TimerQueue<Action>,
    stop: bool,
    /// Deadline the dispatcher is currently sleeping toward.
    awaited: Option<Time>,
    /// Outcome fixed when stop was first set.
    report: Option<ShutdownReport>,
    exited: bool,
}

/// State shared between the scheduler, its handles and the dispatcher.
pub(crate) struct Core {
    gate: Gate<SchedulerState>,
    clock: Clock,
    metrics: Arc<SchedulerMetrics>,
    sink: SharedSink,
    executor: Arc<dyn Executor>,
    pending_policy: PendingPolicy,
    state: AtomicU8,
}

impl Core {
    pub(crate) fn new(
        executor: Arc<dyn Executor>,
        sink: SharedSink,
        pending_policy: PendingPolicy,
    ) -> Self {
        Self {
            gate: Gate::new(SchedulerState {
                queue: TimerQueue::new(),
                stop: false,
                awaited: None,
                report: None,
                exited: false,
            }),
            clock: Clock::new(),
            metrics: Arc::new(SchedulerMetrics::new()),
            sink,
            executor,
            pending_policy,
            state: AtomicU8::new(DispatcherState::Idle as u8),
        }
    }

    pub(crate) fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub(crate) fn dispatcher_state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: DispatcherState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub(crate) fn pending(&self) -> usize {
        self.gate.lock().queue.len()
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.gate.lock().stop
    }

    pub(crate) fn now(&self) -> Time {
        self.clock.now()
    }

    /// Inserts `action` to fire `delay` from now and wakes the dispatcher.
    pub(crate) fn insert(&self, delay: Duration, action: Action) -> Result<(TimerId, Time)> {
        let mut state = self.gate.lock();
        if state.stop {
            return Err(Error::shut_down());
        }
        let deadline = self.clock.deadline_after(delay);
        let id = state.queue.insert(deadline, action);
        if state.awaited.is_some_and(|awaited| deadline < awaited) {
            self.metrics.early_wake();
        }
        self.metrics.task_scheduled();
        drop(state);
        self.gate.notify_one();
        trace!(timer_id = %id, deadline_ns = deadline.as_nanos(), "scheduled");
        Ok((id, deadline))
    }

    /// Cancels a pending task. Refused once shutdown has begun, since the
    /// shutdown report already accounts for every pending task.
    pub(crate) fn cancel(&self, id: TimerId) -> bool {
        let mut state = self.gate.lock();
        if state.stop || !state.queue.cancel(id) {
            return false;
        }
        drop(state);
        self.metrics.task_cancelled();
        // The dispatcher may be sleeping toward the cancelled deadline.
        self.gate.notify_one();
        true
    }

    pub(crate) fn is_pending(&self, id: TimerId) -> bool {
        self.gate.lock().queue.contains(id)
    }

    /// Sets the stop flag and settles pending tasks per the pending policy.
    ///
    /// The first call decides the report; later calls return it unchanged.
    pub(crate) fn begin_shutdown(&self) -> ShutdownReport {
        let mut state = self.gate.lock();
        if let Some(report) = state.report {
            return report;
        }
        state.stop = true;
        let pending = state.queue.len();
        let (report, discarded) = match self.pending_policy {
            PendingPolicy::Drop => (ShutdownReport::new(pending, 0), state.queue.drain()),
            PendingPolicy::Drain => (ShutdownReport::new(0, pending), Vec::new()),
        };
        state.report = Some(report);
        drop(state);
        self.gate.notify_all();

        self.metrics.dropped_at_shutdown(report.dropped() as u64);
        self.metrics.drained_at_shutdown(report.drained() as u64);
        info!(
            dropped = report.dropped(),
            drained = report.drained(),
            "scheduler shutting down"
        );
        // Dropped actions release their captures outside the lock.
        drop(discarded);
        report
    }

    /// Waits for the dispatcher loop to exit. Returns false on timeout.
    pub(crate) fn wait_exited(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.gate.lock();
        while !state.exited {
            match deadline {
                Some(deadline) => {
                    if self.gate.wait_until(&mut state, deadline) {
                        return state.exited;
                    }
                }
                None => self.gate.wait(&mut state),
            }
        }
        true
    }

    /// Hands one task to the executor. Never panics.
    fn fire(&self, task: Task<Action>, handle: &SchedulerHandle) {
        let Task {
            deadline,
            id,
            payload: action,
        } = task;
        let lateness = self.clock.now().duration_since(deadline);
        let job = firing_job(
            id,
            action,
            handle.clone(),
            Arc::clone(&self.metrics),
            self.sink.clone(),
        );
        self.metrics.task_fired(lateness);
        match catch_unwind(AssertUnwindSafe(|| self.executor.execute(job))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                self.metrics.task_rejected();
                self.sink
                    .report(&ActionFailure::new(FailureKind::Rejected(err)).with_timer(id));
            }
            Err(payload) => {
                error!(timer_id = %id, "executor panicked while accepting a job");
                self.metrics.task_rejected();
                let failure = ActionFailure::from_panic(payload.as_ref()).with_timer(id);
                let _ = catch_unwind(AssertUnwindSafe(|| self.sink.report(&failure)));
            }
        }
    }
}

/// Wraps an action so that a panic becomes a reported [`ActionFailure`].
fn firing_job(
    id: TimerId,
    action: Action,
    handle: SchedulerHandle,
    metrics: Arc<SchedulerMetrics>,
    sink: SharedSink,
) -> Job {
    Box::new(move || {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| action(&handle))) {
            metrics.task_failed();
            let failure = ActionFailure::from_panic(payload.as_ref()).with_timer(id);
            // A panicking sink must not take the dispatcher down with it.
            let _ = catch_unwind(AssertUnwindSafe(|| sink.report(&failure)));
        }
    })
}

/// Dispatcher thread body.
pub(crate) fn run(core: &Arc<Core>) {
    let handle = SchedulerHandle::from_core(core);
    info!("dispatcher started");

    let mut state = core.gate.lock();
    loop {
        if state.stop {
            break;
        }
        let now = core.clock.now();
        match state.queue.peek_deadline() {
            None => {
                core.set_state(DispatcherState::Idle);
                state.awaited = None;
                core.gate.wait(&mut state);
            }
            Some(deadline) if deadline > now => {
                core.set_state(DispatcherState::Waiting);
                state.awaited = Some(deadline);
                core.gate
                    .wait_until(&mut state, core.clock.instant_of(deadline));
            }
            Some(_) => {
                core.set_state(DispatcherState::Firing);
                state.awaited = None;
                if let Some(task) = state.queue.pop_next_due(now) {
                    MutexGuard::unlocked(&mut state, || core.fire(task, &handle));
                }
            }
        }
    }

    state.awaited = None;
    let remaining = state.queue.drain();
    if !remaining.is_empty() {
        core.set_state(DispatcherState::Firing);
        debug!(count = remaining.len(), "draining pending tasks");
        MutexGuard::unlocked(&mut state, || {
            for task in remaining {
                core.fire(task, &handle);
            }
        });
    }

    state.exited = true;
    core.set_state(DispatcherState::Stopped);
    drop(state);
    core.gate.notify_all();
    info!("dispatcher stopped");
}

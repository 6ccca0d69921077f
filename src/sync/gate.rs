//! Mutex plus condition variable guarding shared state.
//!
//! Every mutation of the guarded state that can change what a waiter is
//! waiting for must be followed by a notify while the caller still owns (or
//! has just released) the guard. Waiters always re-check their predicate
//! after waking; spurious wakeups are allowed.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::Instant;

/// A lock with a single associated wait queue.
#[derive(Debug, Default)]
pub struct Gate<S> {
    state: Mutex<S>,
    cond: Condvar,
}

impl<S> Gate<S> {
    /// Creates a gate around `state`.
    #[must_use]
    pub fn new(state: S) -> Self {
        Self {
            state: Mutex::new(state),
            cond: Condvar::new(),
        }
    }

    /// Acquires the lock.
    pub fn lock(&self) -> MutexGuard<'_, S> {
        self.state.lock()
    }

    /// Wakes one waiter.
    pub fn notify_one(&self) {
        self.cond.notify_one();
    }

    /// Wakes all waiters.
    pub fn notify_all(&self) {
        self.cond.notify_all();
    }

    /// Blocks until notified.
    pub fn wait(&self, guard: &mut MutexGuard<'_, S>) {
        self.cond.wait(guard);
    }

    /// Blocks until notified or `deadline` passes.
    ///
    /// Returns `true` if the wait timed out.
    pub fn wait_until(&self, guard: &mut MutexGuard<'_, S>, deadline: Instant) -> bool {
        self.cond.wait_until(guard, deadline).timed_out()
    }

    /// Blocks while `condition` holds.
    pub fn wait_while<F>(&self, guard: &mut MutexGuard<'_, S>, mut condition: F)
    where
        F: FnMut(&mut S) -> bool,
    {
        while condition(&mut **guard) {
            self.cond.wait(guard);
        }
    }
}

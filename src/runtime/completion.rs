//! One-shot completion slot for pool submissions.

use crate::error::{ActionFailure, FailureKind};
use crate::sync::Gate;
use std::sync::Arc;
use std::time::{Duration, Instant};

enum Slot<T> {
    Pending,
    Ready(Result<T, ActionFailure>),
    Taken,
}

impl<T> Slot<T> {
    const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Creates a connected completer and handle.
pub(crate) fn completion<T>() -> (Completer<T>, CompletionHandle<T>) {
    let slot = Arc::new(Gate::new(Slot::Pending));
    (
        Completer {
            slot: Some(Arc::clone(&slot)),
        },
        CompletionHandle { slot },
    )
}

/// Writing half. Dropping it unfilled marks the job as abandoned.
pub(crate) struct Completer<T> {
    slot: Option<Arc<Gate<Slot<T>>>>,
}

impl<T> Completer<T> {
    pub(crate) fn complete(mut self, result: Result<T, ActionFailure>) {
        if let Some(slot) = self.slot.take() {
            fill(&slot, result);
        }
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            fill(&slot, Err(ActionFailure::new(FailureKind::Abandoned)));
        }
    }
}

fn fill<T>(slot: &Gate<Slot<T>>, result: Result<T, ActionFailure>) {
    let mut guard = slot.lock();
    if guard.is_pending() {
        *guard = Slot::Ready(result);
    }
    drop(guard);
    slot.notify_all();
}

/// Result of a job submitted to a [`ThreadPool`](super::ThreadPool).
///
/// A panic inside the job is reported here as
/// [`FailureKind::Panicked`]; a job dropped without running reports
/// [`FailureKind::Abandoned`].
pub struct CompletionHandle<T> {
    slot: Arc<Gate<Slot<T>>>,
}

impl<T> CompletionHandle<T> {
    /// Returns true once the job has finished or been abandoned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        !self.slot.lock().is_pending()
    }

    /// Blocks until the job finishes and returns its outcome.
    pub fn wait(self) -> Result<T, ActionFailure> {
        let mut guard = self.slot.lock();
        self.slot.wait_while(&mut guard, |slot| slot.is_pending());
        match std::mem::replace(&mut *guard, Slot::Taken) {
            Slot::Ready(result) => result,
            // Only `wait` takes the value and it consumes the handle.
            Slot::Pending | Slot::Taken => Err(ActionFailure::new(FailureKind::Abandoned)),
        }
    }

    /// Blocks for at most `timeout`. Returns true if the job has finished,
    /// in which case [`wait`](Self::wait) returns without blocking.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.slot.lock();
        while guard.is_pending() {
            if self.slot.wait_until(&mut guard, deadline) {
                return !guard.is_pending();
            }
        }
        true
    }
}

impl<T> std::fmt::Debug for CompletionHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

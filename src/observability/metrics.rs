//! Scheduler counters.
//!
//! All counters are relaxed atomics updated from whichever thread observes
//! the event. A [`MetricsSnapshot`] is a point-in-time copy; individual
//! fields are consistent with themselves but not with each other.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters shared by a scheduler and its dispatcher.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    scheduled: AtomicU64,
    fired: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
    dropped_at_shutdown: AtomicU64,
    drained_at_shutdown: AtomicU64,
    early_wakes: AtomicU64,
    max_lateness_ns: AtomicU64,
}

impl SchedulerMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a task accepted by `schedule`.
    pub fn task_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a task leaving the queue for the executor, with how late it
    /// was.
    pub fn task_fired(&self, lateness: Duration) {
        self.fired.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(lateness.as_nanos()).unwrap_or(u64::MAX);
        self.max_lateness_ns.fetch_max(nanos, Ordering::Relaxed);
    }

    /// Records an action that panicked.
    pub fn task_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful cancellation.
    pub fn task_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an action the executor refused.
    pub fn task_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Records tasks discarded by the drop policy at shutdown.
    pub fn dropped_at_shutdown(&self, count: u64) {
        self.dropped_at_shutdown.fetch_add(count, Ordering::Relaxed);
    }

    /// Records tasks run early by the drain policy at shutdown.
    pub fn drained_at_shutdown(&self, count: u64) {
        self.drained_at_shutdown.fetch_add(count, Ordering::Relaxed);
    }

    /// Records an insert that moved the dispatcher's wake target earlier.
    pub fn early_wake(&self) {
        self.early_wakes.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            fired: self.fired.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dropped_at_shutdown: self.dropped_at_shutdown.load(Ordering::Relaxed),
            drained_at_shutdown: self.drained_at_shutdown.load(Ordering::Relaxed),
            early_wakes: self.early_wakes.load(Ordering::Relaxed),
            max_lateness_ns: self.max_lateness_ns.load(Ordering::Relaxed),
        }
    }
}

/// A copy of [`SchedulerMetrics`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Tasks accepted by `schedule`.
    pub scheduled: u64,
    /// Tasks dispatched to the executor, including ones it rejected.
    pub fired: u64,
    /// Actions that panicked.
    pub failed: u64,
    /// Tasks cancelled before firing.
    pub cancelled: u64,
    /// Actions the executor refused.
    pub rejected: u64,
    /// Tasks discarded at shutdown.
    pub dropped_at_shutdown: u64,
    /// Tasks fired early at shutdown.
    pub drained_at_shutdown: u64,
    /// Inserts that preempted the dispatcher's current wait target.
    pub early_wakes: u64,
    /// Largest observed gap between a deadline and its firing.
    pub max_lateness_ns: u64,
}

impl MetricsSnapshot {
    /// Tasks still unaccounted for: neither fired, cancelled, nor disposed of
    /// at shutdown.
    #[must_use]
    pub const fn outstanding(&self) -> u64 {
        self.scheduled
            .saturating_sub(self.fired)
            .saturating_sub(self.cancelled)
            .saturating_sub(self.dropped_at_shutdown)
    }

    /// Largest observed lateness.
    #[must_use]
    pub const fn max_lateness(&self) -> Duration {
        Duration::from_nanos(self.max_lateness_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = SchedulerMetrics::new();
        metrics.task_scheduled();
        metrics.task_scheduled();
        metrics.task_scheduled();
        metrics.task_fired(Duration::from_micros(5));
        metrics.task_cancelled();
        metrics.dropped_at_shutdown(1);

        let snap = metrics.snapshot();
        assert_eq!(snap.scheduled, 3);
        assert_eq!(snap.fired, 1);
        assert_eq!(snap.cancelled, 1);
        assert_eq!(snap.dropped_at_shutdown, 1);
        assert_eq!(snap.outstanding(), 0);
    }

    #[test]
    fn lateness_keeps_maximum() {
        let metrics = SchedulerMetrics::new();
        metrics.task_fired(Duration::from_millis(3));
        metrics.task_fired(Duration::from_millis(1));
        assert_eq!(metrics.snapshot().max_lateness(), Duration::from_millis(3));
    }

    #[test]
    fn snapshot_serializes() {
        let metrics = SchedulerMetrics::new();
        metrics.early_wake();
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("\"early_wakes\":1"), "{json}");
    }
}

//! Metrics and failure reporting.
//!
//! - [`SchedulerMetrics`]: lock-free counters updated by the scheduler and
//!   dispatcher, read through [`MetricsSnapshot`].
//! - [`ErrorSink`]: where action panics and executor rejections go, since
//!   they happen long after `schedule` has returned.

pub mod metrics;
pub mod sink;

pub use metrics::{MetricsSnapshot, SchedulerMetrics};
pub use sink::{ErrorSink, LogSink, SharedSink};

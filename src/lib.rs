//! Tickless: a delayed-execution task scheduler.
//!
//! # Overview
//!
//! Callers register an action together with a delay; the scheduler runs the
//! action no earlier than that delay. Any number of threads may schedule
//! concurrently. A single dispatcher thread sleeps until the earliest
//! outstanding deadline, is woken early when an earlier deadline arrives,
//! and hands due actions to an executor in deadline order.
//!
//! # Guarantees
//!
//! - **Never early**: an action never starts before its deadline
//! - **Ordered**: earlier deadlines fire first; equal deadlines fire in
//!   scheduling order
//! - **Exactly once**: every accepted task fires once, is cancelled, or is
//!   settled by the pending policy at shutdown
//! - **Bounded threads**: one dispatcher plus an optional fixed-size pool;
//!   never a thread per timer
//! - **Monotonic**: deadlines are measured on `Instant`, never wall time
//!
//! # Module Structure
//!
//! - [`scheduler`]: The public service ([`Scheduler`], handles, builder)
//! - [`config`]: Configuration and the layered [`ConfigLoader`]
//! - [`runtime`]: Timer queue, dispatcher loop and executors
//! - [`sync`]: The lock/condition-variable gate
//! - [`observability`]: Metrics and error sinks
//! - [`time`]: The monotonic clock
//! - [`types`]: Identifiers and timestamps
//! - [`error`](mod@error): Error types
//! - [`tracing_compat`]: Optional tracing integration (requires `tracing-integration` feature)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod config;
pub mod error;
pub mod observability;
pub mod runtime;
pub mod scheduler;
pub mod sync;
pub mod time;
pub mod tracing_compat;
pub mod types;

// ── Test-only modules ───────────────────────────────────────────────────
#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

// Re-exports for convenient access to core types
pub use config::{
    Backpressure, ConfigError, ConfigLoader, ExecutionMode, PendingPolicy, PoolConfig,
    SchedulerConfig,
};
pub use error::{ActionFailure, Error, ErrorKind, ExecutorError, FailureKind, Result};
pub use observability::{ErrorSink, LogSink, MetricsSnapshot};
pub use runtime::{CompletionHandle, DispatcherState, Executor, Inline, Job, ThreadPool};
pub use scheduler::{Scheduler, SchedulerBuilder, SchedulerHandle, ShutdownReport, TimerHandle};
pub use types::{Time, TimerId};

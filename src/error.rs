//! Error types for the scheduler.
//!
//! Errors that reach a caller synchronously are carried by [`Error`], a
//! kind plus optional message and source. Failures that happen while an
//! action runs never reach the caller of `schedule`; they are described by
//! [`ActionFailure`] and routed to an
//! [`ErrorSink`](crate::observability::ErrorSink) instead.

use core::fmt;
use std::any::Any;
use std::sync::Arc;

use crate::types::TimerId;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A negative delay was passed to `schedule`.
    InvalidDelay,
    /// The scheduler (or executor) has stopped accepting work.
    ShutDown,
    /// The executor's queue is full and the backpressure policy rejects.
    Saturated,
    /// The OS refused to start a dispatcher or worker thread.
    Spawn,
    /// Configuration was invalid.
    Config,
}

impl ErrorKind {
    /// Returns a short static description of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidDelay => "invalid delay",
            Self::ShutDown => "scheduler shut down",
            Self::Saturated => "executor saturated",
            Self::Spawn => "thread spawn failed",
            Self::Config => "invalid configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for scheduler operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Creates an `InvalidDelay` error for the rejected value.
    #[must_use]
    pub fn invalid_delay(delay_ms: i64) -> Self {
        Self::new(ErrorKind::InvalidDelay)
            .with_message(format!("delay must be non-negative, got {delay_ms}ms"))
    }

    /// Creates a `ShutDown` error.
    #[must_use]
    pub const fn shut_down() -> Self {
        Self::new(ErrorKind::ShutDown)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns true if this error is a rejected delay.
    #[must_use]
    pub const fn is_invalid_delay(&self) -> bool {
        matches!(self.kind, ErrorKind::InvalidDelay)
    }

    /// Returns true if the scheduler had already stopped.
    #[must_use]
    pub const fn is_shut_down(&self) -> bool {
        matches!(self.kind, ErrorKind::ShutDown)
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<ExecutorError> for Error {
    fn from(err: ExecutorError) -> Self {
        let kind = match err {
            ExecutorError::Saturated { .. } => ErrorKind::Saturated,
            ExecutorError::ShutDown => ErrorKind::ShutDown,
        };
        Self::new(kind).with_source(err)
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::new(ErrorKind::Config)
            .with_message(err.to_string())
            .with_source(err)
    }
}

/// Result type for scheduler operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Rejection returned by an [`Executor`](crate::runtime::Executor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// The work queue is full and the backpressure policy is `Reject`.
    #[error("executor queue full ({capacity} jobs queued)")]
    Saturated {
        /// Capacity of the queue that rejected the job.
        capacity: usize,
    },
    /// The executor has been shut down.
    #[error("executor shut down")]
    ShutDown,
}

/// Why an action did not complete normally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureKind {
    /// The action panicked; the payload message is captured when it is a
    /// string.
    #[error("action panicked: {0}")]
    Panicked(String),
    /// The executor refused the action, so it never ran.
    #[error("action rejected by executor: {0}")]
    Rejected(ExecutorError),
    /// The executor was torn down before running the action.
    #[error("action abandoned before it ran")]
    Abandoned,
}

/// A failure observed at the firing boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    timer: Option<TimerId>,
    kind: FailureKind,
}

impl ActionFailure {
    /// Creates a failure record.
    #[must_use]
    pub const fn new(kind: FailureKind) -> Self {
        Self { timer: None, kind }
    }

    /// Builds a `Panicked` failure from a `catch_unwind` payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::new(FailureKind::Panicked(panic_message(payload)))
    }

    /// Attaches the id of the timer whose action failed.
    #[must_use]
    pub fn with_timer(mut self, timer: TimerId) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Returns the timer id, when the failure came from a scheduled task.
    #[must_use]
    pub const fn timer(&self) -> Option<TimerId> {
        self.timer
    }

    /// Returns the failure kind.
    #[must_use]
    pub const fn kind(&self) -> &FailureKind {
        &self.kind
    }

    /// Returns true if the action panicked.
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self.kind, FailureKind::Panicked(_))
    }
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timer {
            Some(id) => write!(f, "{id}: {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for ActionFailure {}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

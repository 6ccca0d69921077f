//! Destinations for failures observed at the firing boundary.

use crate::error::ActionFailure;
use std::fmt;
use std::sync::Arc;

/// Receives failures that cannot be returned to any caller.
///
/// Sinks run on the thread that observed the failure, which is usually the
/// dispatcher. They must not block for long and must not panic.
pub trait ErrorSink: Send + Sync {
    /// Reports one failure.
    fn report(&self, failure: &ActionFailure);
}

impl<F> ErrorSink for F
where
    F: Fn(&ActionFailure) + Send + Sync,
{
    fn report(&self, failure: &ActionFailure) {
        self(failure);
    }
}

/// Logs every failure at `error` level.
///
/// Goes through `tracing` when the crate is built with it and to standard
/// error otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ErrorSink for LogSink {
    #[cfg(any(test, feature = "tracing-integration", feature = "test-internals"))]
    fn report(&self, failure: &ActionFailure) {
        tracing::error!(
            timer_id = ?failure.timer(),
            failure = %failure.kind(),
            "timer action failed"
        );
    }

    #[cfg(not(any(test, feature = "tracing-integration", feature = "test-internals")))]
    fn report(&self, failure: &ActionFailure) {
        match failure.timer() {
            Some(id) => eprintln!("tickless: timer action failed: timer_id={id} failure={}", failure.kind()),
            None => eprintln!("tickless: timer action failed: failure={}", failure.kind()),
        }
    }
}

/// Shared, type-erased sink.
#[derive(Clone)]
pub struct SharedSink(Arc<dyn ErrorSink>);

impl SharedSink {
    /// Wraps a sink.
    pub fn new(sink: impl ErrorSink + 'static) -> Self {
        Self(Arc::new(sink))
    }

    /// Forwards to the wrapped sink.
    pub fn report(&self, failure: &ActionFailure) {
        self.0.report(failure);
    }
}

impl Default for SharedSink {
    fn default() -> Self {
        Self::new(LogSink)
    }
}

impl fmt::Debug for SharedSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSink(..)")
    }
}

//! Shared helpers for integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tickless::ActionFailure;

pub use tickless::test_utils::init_test_logging;

/// Upper bound for any single wait in a test; generous for loaded CI hosts.
pub const PATIENCE: Duration = Duration::from_secs(10);

/// Starts a named test with logging.
pub fn init_test(name: &str) {
    init_test_logging();
    tickless::test_phase!(name);
}

/// Receives exactly `count` messages or panics after [`PATIENCE`].
pub fn recv_n<T>(rx: &Receiver<T>, count: usize) -> Vec<T> {
    let deadline = Instant::now() + PATIENCE;
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let left = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok(value) => out.push(value),
            Err(RecvTimeoutError::Timeout) => {
                panic!("timed out after {} of {count} messages", out.len())
            }
            Err(RecvTimeoutError::Disconnected) => {
                panic!("channel closed after {} of {count} messages", out.len())
            }
        }
    }
    out
}

/// Asserts nothing arrives on `rx` within `window`.
pub fn assert_silent<T: std::fmt::Debug>(rx: &Receiver<T>, window: Duration) {
    if let Ok(value) = rx.recv_timeout(window) {
        panic!("unexpected message: {value:?}");
    }
}

/// Error sink that keeps every failure for inspection.
#[derive(Clone, Default)]
pub struct CollectingSink {
    failures: Arc<Mutex<Vec<ActionFailure>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A closure suitable for `SchedulerBuilder::error_sink`.
    pub fn sink(&self) -> impl Fn(&ActionFailure) + Send + Sync + 'static {
        let failures = Arc::clone(&self.failures);
        move |failure: &ActionFailure| failures.lock().push(failure.clone())
    }

    pub fn failures(&self) -> Vec<ActionFailure> {
        self.failures.lock().clone()
    }

    /// Polls until at least `count` failures were reported.
    pub fn wait_for(&self, count: usize) -> Vec<ActionFailure> {
        let deadline = Instant::now() + PATIENCE;
        loop {
            let seen = self.failures();
            if seen.len() >= count {
                return seen;
            }
            assert!(
                Instant::now() < deadline,
                "only {} of {count} failures reported",
                seen.len()
            );
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

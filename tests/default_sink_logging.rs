//! The default error sink logs executor rejections.
//!
//! Lives in its own test binary because it installs a process-wide
//! subscriber: rejections are reported from the dispatcher thread, which a
//! thread-local subscriber would not see.

#![cfg(any(feature = "test-internals", feature = "tracing-integration"))]

use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tickless::{Backpressure, ExecutionMode, PoolConfig, Scheduler};

const PATIENCE: Duration = Duration::from_secs(10);

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

#[test]
fn default_sink_logs_pool_rejections() {
    let captured = Captured::default();
    let writer = captured.clone();
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .init();

    let scheduler = Scheduler::builder()
        .execution(ExecutionMode::Pool(
            PoolConfig::with_workers(1)
                .queue_capacity(1)
                .backpressure(Backpressure::Reject),
        ))
        .build()
        .unwrap();

    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    scheduler
        .schedule(0, move || {
            started_tx.send(()).unwrap();
            let _ = release_rx.recv_timeout(PATIENCE);
        })
        .unwrap();
    started_rx.recv_timeout(PATIENCE).unwrap();

    // One fits in the queue, the other two are refused.
    for _ in 0..3 {
        scheduler.schedule(0, || {}).unwrap();
    }

    let deadline = Instant::now() + PATIENCE;
    while scheduler.metrics().rejected < 2 {
        assert!(Instant::now() < deadline, "rejections never happened");
        thread::sleep(Duration::from_millis(1));
    }
    release_tx.send(()).unwrap();
    let _ = scheduler.shutdown();

    let text = captured.text();
    let reported = text.matches("timer action failed").count();
    assert_eq!(reported, 2, "default sink output: {text:?}");
    assert!(text.contains("executor queue full"), "{text:?}");
}

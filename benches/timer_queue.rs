//! Timer queue and scheduler benchmarks.
//!
//! - Insert into queues of growing size
//! - Cancel (tombstone) followed by draining past the tombstones
//! - Pop all due tasks at once
//! - End-to-end `schedule` throughput from one thread
//!
//! Run: `cargo bench --bench timer_queue`

#![allow(missing_docs)]
#![allow(clippy::semicolon_if_nothing_returned)]

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tickless::runtime::TimerQueue;
use tickless::{Scheduler, Time};

const SIZES: [usize; 3] = [100, 1_000, 10_000];

fn filled(size: usize) -> TimerQueue<u64> {
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let mut queue = TimerQueue::new();
    for n in 0..size as u64 {
        queue.insert(Time::from_nanos(rng.u64(0..1_000_000_000)), n);
    }
    queue
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_queue/insert");
    for size in SIZES {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| black_box(filled(size)))
        });
    }
    group.finish();
}

fn bench_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_queue/cancel_half_then_drain");
    for size in SIZES {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let mut queue = TimerQueue::new();
                    let ids: Vec<_> = (0..size as u64)
                        .map(|n| queue.insert(Time::from_nanos(n * 7 % 1_000), n))
                        .collect();
                    (queue, ids)
                },
                |(mut queue, ids)| {
                    for id in ids.iter().step_by(2) {
                        queue.cancel(*id);
                    }
                    black_box(queue.drain())
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_pop_due(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_queue/pop_due_all");
    for size in SIZES {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || filled(size),
                |mut queue| black_box(queue.pop_due(Time::MAX)),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler/schedule");
    group.throughput(Throughput::Elements(1));
    let scheduler = Scheduler::new().unwrap();
    let counter = Arc::new(AtomicU64::new(0));
    group.bench_function("far_future", |b| {
        b.iter(|| {
            let counter = Arc::clone(&counter);
            black_box(
                scheduler
                    .schedule(3_600_000, move || {
                        counter.fetch_add(1, Ordering::Relaxed);
                    })
                    .unwrap(),
            )
        })
    });
    group.finish();
    let _ = scheduler.shutdown();
}

criterion_group!(
    benches,
    bench_insert,
    bench_cancel,
    bench_pop_due,
    bench_schedule,
);
criterion_main!(benches);

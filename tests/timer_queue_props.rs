//! Property-based tests for the timer queue.
//!
//! Random interleavings of insert, cancel and pop are checked against a
//! sorted-vector model: every pop returns the model's minimum, nothing due
//! is held back, and cancelled tasks never come out.

use proptest::prelude::*;
use tickless::runtime::TimerQueue;
use tickless::{Time, TimerId};

#[derive(Debug, Clone)]
enum Op {
    Insert(u64),
    Cancel(usize),
    PopDue(u64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0_u64..1_000).prop_map(Op::Insert),
        1 => any::<usize>().prop_map(Op::Cancel),
        2 => (0_u64..1_000).prop_map(Op::PopDue),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Popping everything yields ascending (deadline, id).
    #[test]
    fn drain_is_sorted(deadlines in prop::collection::vec(0_u64..10_000, 0..200)) {
        let mut queue = TimerQueue::new();
        for (n, d) in deadlines.iter().enumerate() {
            queue.insert(Time::from_millis(*d), n);
        }
        let drained = queue.drain();
        prop_assert_eq!(drained.len(), deadlines.len());
        for pair in drained.windows(2) {
            prop_assert!((pair[0].deadline, pair[0].id) < (pair[1].deadline, pair[1].id));
        }
    }

    /// Equal deadlines come out in insertion order.
    #[test]
    fn ties_are_fifo(count in 1_usize..100, deadline in 0_u64..1_000) {
        let mut queue = TimerQueue::new();
        for n in 0..count {
            queue.insert(Time::from_millis(deadline), n);
        }
        let order: Vec<usize> = queue
            .pop_due(Time::from_millis(deadline))
            .into_iter()
            .map(|t| t.payload)
            .collect();
        prop_assert_eq!(order, (0..count).collect::<Vec<_>>());
    }

    /// The queue agrees with a sorted-vector model under random operations.
    #[test]
    fn matches_model(ops in prop::collection::vec(arb_op(), 1..300)) {
        let mut queue = TimerQueue::new();
        let mut model: Vec<(Time, TimerId)> = Vec::new();
        let mut issued: Vec<TimerId> = Vec::new();

        for op in ops {
            match op {
                Op::Insert(ms) => {
                    let deadline = Time::from_millis(ms);
                    let id = queue.insert(deadline, ());
                    model.push((deadline, id));
                    issued.push(id);
                }
                Op::Cancel(pick) => {
                    if issued.is_empty() {
                        continue;
                    }
                    let id = issued[pick % issued.len()];
                    let in_model = model.iter().position(|(_, m)| *m == id);
                    let cancelled = queue.cancel(id);
                    prop_assert_eq!(cancelled, in_model.is_some());
                    if let Some(pos) = in_model {
                        model.remove(pos);
                    }
                }
                Op::PopDue(ms) => {
                    let now = Time::from_millis(ms);
                    model.sort();
                    let split = model.partition_point(|(d, _)| *d <= now);
                    let expected: Vec<(Time, TimerId)> = model.drain(..split).collect();
                    let popped: Vec<(Time, TimerId)> = queue
                        .pop_due(now)
                        .into_iter()
                        .map(|t| (t.deadline, t.id))
                        .collect();
                    prop_assert_eq!(popped, expected);
                }
            }
            prop_assert_eq!(queue.len(), model.len());
            model.sort();
            prop_assert_eq!(queue.peek_deadline(), model.first().map(|(d, _)| *d));
        }
    }
}

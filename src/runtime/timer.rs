//! Timer queue for deadline management.
//!
//! A min-heap of pending tasks keyed by `(deadline, id)`. Ids come from a
//! monotonically increasing sequence, so equal deadlines pop in insertion
//! order.
//!
//! Cancellation is lazy: a cancelled id is removed from the live set and its
//! heap entry becomes a tombstone that is discarded when it reaches the top,
//! or in bulk once tombstones outnumber live entries.
//!
//! The queue is not synchronized. The scheduler only touches it while
//! holding its gate lock.

use crate::types::{Time, TimerId};
use hashbrown::HashSet;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Heaps smaller than this are never compacted; the tombstones are cheap.
const COMPACT_MIN_LEN: usize = 64;

struct TimerEntry<T> {
    deadline: Time,
    id: TimerId,
    payload: T,
}

impl<T> TimerEntry<T> {
    fn key(&self) -> (Time, TimerId) {
        (self.deadline, self.id)
    }
}

impl<T> PartialEq for TimerEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T> Eq for TimerEntry<T> {}

impl<T> Ord for TimerEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first).
        other.key().cmp(&self.key())
    }
}

impl<T> PartialOrd for TimerEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A task removed from the queue.
#[derive(Debug)]
pub struct Task<T> {
    /// When the task became eligible to fire.
    pub deadline: Time,
    /// The id issued at insertion.
    pub id: TimerId,
    /// The caller's payload, usually the action to run.
    pub payload: T,
}

/// A min-heap of pending tasks ordered by `(deadline, id)`.
pub struct TimerQueue<T> {
    heap: BinaryHeap<TimerEntry<T>>,
    live: HashSet<TimerId>,
    next_seq: u64,
}

impl<T> TimerQueue<T> {
    /// Creates a new empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashSet::new(),
            next_seq: 0,
        }
    }

    /// Returns the number of pending (non-cancelled) tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns true if no task is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Adds a task with the given deadline and returns its id.
    ///
    /// Deadlines in the past are accepted; such a task is due immediately.
    pub fn insert(&mut self, deadline: Time, payload: T) -> TimerId {
        let id = TimerId::from_raw(self.next_seq);
        self.next_seq += 1;
        self.live.insert(id);
        self.heap.push(TimerEntry {
            deadline,
            id,
            payload,
        });
        id
    }

    /// Returns the earliest pending deadline, if any.
    pub fn peek_deadline(&mut self) -> Option<Time> {
        self.discard_dead_head();
        self.heap.peek().map(|e| e.deadline)
    }

    /// Pops the earliest task if its deadline is `<= now`.
    pub fn pop_next_due(&mut self, now: Time) -> Option<Task<T>> {
        self.discard_dead_head();
        if self.heap.peek()?.deadline > now {
            return None;
        }
        let entry = self.heap.pop()?;
        self.live.remove(&entry.id);
        Some(Task {
            deadline: entry.deadline,
            id: entry.id,
            payload: entry.payload,
        })
    }

    /// Pops all tasks whose deadline is `<= now`, earliest first.
    pub fn pop_due(&mut self, now: Time) -> Vec<Task<T>> {
        let mut expired = Vec::with_capacity(4);
        while let Some(task) = self.pop_next_due(now) {
            expired.push(task);
        }
        expired
    }

    /// Removes every pending task regardless of deadline, earliest first.
    pub fn drain(&mut self) -> Vec<Task<T>> {
        self.pop_due(Time::MAX)
    }

    /// Cancels a pending task.
    ///
    /// Returns `false` if the task already fired, was already cancelled, or
    /// was never issued by this queue.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        if !self.live.remove(&id) {
            return false;
        }
        if self.heap.len() >= COMPACT_MIN_LEN && self.heap.len() > 2 * self.live.len() {
            let live = &self.live;
            self.heap.retain(|e| live.contains(&e.id));
        }
        true
    }

    /// Returns true if `id` is still pending.
    #[must_use]
    pub fn contains(&self, id: TimerId) -> bool {
        self.live.contains(&id)
    }

    /// Clears all tasks, dropping their payloads.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }

    fn discard_dead_head(&mut self) {
        while let Some(head) = self.heap.peek() {
            if self.live.contains(&head.id) {
                break;
            }
            self.heap.pop();
        }
    }

    #[cfg(test)]
    fn heap_len(&self) -> usize {
        self.heap.len()
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TimerQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerQueue")
            .field("pending", &self.live.len())
            .field("tombstones", &(self.heap.len() - self.live.len()))
            .field("next_seq", &self.next_seq)
            .finish()
    }
}

//! Deadline Queue: items released in deadline order, not arrival order
//!
//! A delayed job that becomes due early must never wait behind a job with a
//! longer delay that happened to arrive first. The queue is a min-heap keyed by
//! deadline; items with equal deadlines come out in the order they were pushed.
//!
//! The queue is pure logic: it never sleeps. The caller decides how long to wait
//! using [`DeadlineQueue::next_deadline`] and pops with [`DeadlineQueue::pop_due`].
//!
//! # Example
//!
//! ```
//! use podwatch_core_resilience::DeadlineQueue;
//! use std::time::Duration;
//! use tokio::time::Instant;
//!
//! let now = Instant::now();
//! let mut queue = DeadlineQueue::new();
//! queue.push(now + Duration::from_secs(10), "slow");
//! queue.push(now + Duration::from_secs(1), "fast");
//!
//! assert_eq!(queue.next_deadline(), Some(now + Duration::from_secs(1)));
//! assert_eq!(queue.pop_due(now + Duration::from_secs(2)), Some("fast"));
//! assert_eq!(queue.pop_due(now + Duration::from_secs(2)), None);
//! ```

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tokio::time::Instant;

struct Slot<T> {
    deadline: Instant,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<T> Eq for Slot<T> {}

impl<T> PartialOrd for Slot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Slot<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Min-heap of items keyed by the instant they become due
pub struct DeadlineQueue<T> {
    heap: BinaryHeap<Reverse<Slot<T>>>,
    next_seq: u64,
    total_pushed: u64,
}

impl<T> DeadlineQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            total_pushed: 0,
        }
    }

    /// Schedule an item to become due at `deadline`
    pub fn push(&mut self, deadline: Instant, item: T) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.total_pushed += 1;
        self.heap.push(Reverse(Slot {
            deadline,
            seq,
            item,
        }));
    }

    /// Deadline of the earliest item, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(slot)| slot.deadline)
    }

    /// Pop the earliest item if its deadline is at or before `now`
    pub fn pop_due(&mut self, now: Instant) -> Option<T> {
        match self.heap.peek() {
            Some(Reverse(slot)) if slot.deadline <= now => {
                self.heap.pop().map(|Reverse(slot)| slot.item)
            }
            _ => None,
        }
    }

    /// Remove every queued item, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.heap.len();
        self.heap.clear();
        dropped
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Total items ever pushed
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }
}

impl<T> Default for DeadlineQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for DeadlineQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineQueue")
            .field("len", &self.heap.len())
            .field("next_deadline", &self.next_deadline())
            .field("total_pushed", &self.total_pushed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_queue() {
        let mut queue: DeadlineQueue<u32> = DeadlineQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.next_deadline(), None);
        assert_eq!(queue.pop_due(Instant::now()), None);
    }

    #[test]
    fn test_earliest_deadline_first() {
        let now = Instant::now();
        let mut queue = DeadlineQueue::new();
        queue.push(now + Duration::from_secs(30), "a");
        queue.push(now + Duration::from_secs(5), "b");
        queue.push(now + Duration::from_secs(10), "c");

        let later = now + Duration::from_secs(60);
        assert_eq!(queue.pop_due(later), Some("b"));
        assert_eq!(queue.pop_due(later), Some("c"));
        assert_eq!(queue.pop_due(later), Some("a"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_not_due_stays_queued() {
        let now = Instant::now();
        let mut queue = DeadlineQueue::new();
        queue.push(now + Duration::from_secs(5), 1);

        assert_eq!(queue.pop_due(now), None);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_due(now + Duration::from_secs(5)), Some(1));
    }

    #[test]
    fn test_equal_deadlines_keep_insertion_order() {
        let now = Instant::now();
        let mut queue = DeadlineQueue::new();
        for i in 0..5 {
            queue.push(now, i);
        }

        let drained: Vec<_> = std::iter::from_fn(|| queue.pop_due(now)).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_short_job_not_blocked_by_long_job() {
        let now = Instant::now();
        let mut queue = DeadlineQueue::new();
        queue.push(now + Duration::from_secs(300), "long");
        queue.push(now + Duration::from_secs(1), "short");

        assert_eq!(queue.pop_due(now + Duration::from_secs(2)), Some("short"));
        assert_eq!(queue.pop_due(now + Duration::from_secs(2)), None);
    }

    #[test]
    fn test_clear_and_counters() {
        let now = Instant::now();
        let mut queue = DeadlineQueue::new();
        queue.push(now, 'x');
        queue.push(now, 'y');

        assert_eq!(queue.total_pushed(), 2);
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.total_pushed(), 2);
    }
}

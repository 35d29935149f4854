//! Coalescing map of pending superpod changes
//!
//! At most one pending operator per superpod. Drained in the order superpods
//! were first recorded, so a superpod that keeps changing cannot starve others.

use crate::topology::model::Operator;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
struct Pending {
    ops: HashMap<String, Operator>,
    order: VecDeque<String>,
}

/// Pending superpod operators, latest wins
#[derive(Debug, Default)]
pub struct EventMap {
    pending: Mutex<Pending>,
}

impl EventMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change.
    ///
    /// `Delete` always overwrites. `Add`/`Update` on an already pending superpod
    /// collapse to `Update`.
    pub fn record(&self, super_pod_id: &str, operator: Operator) {
        let mut pending = self.pending.lock();
        let Pending { ops, order } = &mut *pending;

        match ops.get_mut(super_pod_id) {
            Some(existing) => {
                *existing = match operator {
                    Operator::Delete => Operator::Delete,
                    Operator::Add | Operator::Update => Operator::Update,
                };
            }
            None => {
                ops.insert(super_pod_id.to_string(), operator);
                order.push_back(super_pod_id.to_string());
            }
        }
    }

    /// Put back a failed operator unless a newer one is already pending.
    ///
    /// Returns false when the retry was superseded.
    pub fn requeue(&self, super_pod_id: &str, operator: Operator) -> bool {
        let mut pending = self.pending.lock();
        if pending.ops.contains_key(super_pod_id) {
            return false;
        }
        pending.ops.insert(super_pod_id.to_string(), operator);
        pending.order.push_back(super_pod_id.to_string());
        true
    }

    /// Take up to `batch_size` pending operators, oldest first
    pub fn drain(&self, batch_size: usize) -> Vec<(String, Operator)> {
        let mut pending = self.pending.lock();
        let mut batch = Vec::with_capacity(batch_size.min(pending.order.len()));

        while batch.len() < batch_size {
            let Some(id) = pending.order.pop_front() else {
                break;
            };
            if let Some(operator) = pending.ops.remove(&id) {
                batch.push((id, operator));
            }
        }
        batch
    }

    /// Pending operator for a superpod
    pub fn get(&self, super_pod_id: &str) -> Option<Operator> {
        self.pending.lock().ops.get(super_pod_id).copied()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_then_update_collapses() {
        let events = EventMap::new();
        events.record("1", Operator::Add);
        events.record("1", Operator::Update);
        events.record("1", Operator::Add);
        assert_eq!(events.len(), 1);
        assert_eq!(events.get("1"), Some(Operator::Update));
    }

    #[test]
    fn test_delete_overwrites() {
        let events = EventMap::new();
        events.record("1", Operator::Add);
        events.record("1", Operator::Update);
        events.record("1", Operator::Delete);
        assert_eq!(events.drain(10), vec![("1".to_string(), Operator::Delete)]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_drain_in_first_recorded_order() {
        let events = EventMap::new();
        for id in ["3", "1", "2"] {
            events.record(id, Operator::Add);
        }
        events.record("3", Operator::Update);

        let first = events.drain(2);
        assert_eq!(
            first,
            vec![
                ("3".to_string(), Operator::Update),
                ("1".to_string(), Operator::Add)
            ]
        );
        assert_eq!(events.drain(2), vec![("2".to_string(), Operator::Add)]);
        assert!(events.drain(2).is_empty());
    }

    #[test]
    fn test_requeue_does_not_clobber_newer_event() {
        let events = EventMap::new();
        events.record("1", Operator::Delete);
        assert!(!events.requeue("1", Operator::Update));
        assert_eq!(events.get("1"), Some(Operator::Delete));

        events.drain(1);
        assert!(events.requeue("1", Operator::Update));
        assert_eq!(events.get("1"), Some(Operator::Update));
    }
}

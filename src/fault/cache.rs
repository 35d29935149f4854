//! Fault lifecycle cache
//!
//! Holds the active faults per node. Presence of an entry is the ground truth
//! that a fault is active. Recoveries seen inside the grace window do not
//! remove the entry at once: they schedule a [`DeletionJob`] for
//! `added + grace`. An `Occur` arriving before that job fires cancels it.
//!
//! Cancellation is ticket based. A scheduling transition stamps the entry with
//! a fresh ticket and puts the same ticket on the job. The job only removes an
//! entry whose ticket still matches, so cancelled or superseded jobs fall
//! through as no-ops when they come due.

use crate::fault::deletion::{DeletionJob, DeletionQueue};
use crate::fault::model::{Assertion, FaultEvent, FaultLevel, FaultType};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default grace window between a recovery and the entry's removal
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Externally visible view of one active fault
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultRecord {
    pub node_name: String,
    pub fault_key: String,
    pub fault_type: FaultType,
    pub fault_code: String,
    pub level: FaultLevel,
    pub device_ids: BTreeSet<u32>,
    pub fault_time: i64,
    pub added_at: DateTime<Utc>,
    pub pending_delete: bool,
}

#[derive(Debug)]
struct Entry {
    record: FaultRecord,
    added: Instant,
    pending: Option<u64>,
}

impl Entry {
    fn view(&self) -> FaultRecord {
        FaultRecord {
            pending_delete: self.pending.is_some(),
            ..self.record.clone()
        }
    }
}

/// What a single event did to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// New entry for an unseen fault
    Created,
    /// Occur on an already active fault
    Duplicate,
    /// Occur cancelled a pending deletion
    DeletionCancelled,
    /// Recover inside the grace window; removal queued
    DeletionScheduled { delete_at: Instant },
    /// Recover after the grace window; entry removed at once
    Removed,
    /// Recover for an absent fault; a job was queued that will match nothing
    OrphanScheduled { delete_at: Instant },
}

type NodeFaults = HashMap<String, Entry>;

/// Thread-safe per-node fault cache
pub struct FaultCache {
    grace: Duration,
    nodes: RwLock<HashMap<String, NodeFaults>>,
    next_ticket: AtomicU64,
    deletions: Arc<DeletionQueue>,
}

impl FaultCache {
    pub fn new(grace: Duration, deletions: Arc<DeletionQueue>) -> Self {
        Self {
            grace,
            nodes: RwLock::new(HashMap::new()),
            next_ticket: AtomicU64::new(1),
            deletions,
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    /// Apply one fault event. Scheduling happens after the cache lock is released.
    pub fn apply(&self, event: &FaultEvent) -> Transition {
        let now = Instant::now();
        let (transition, job) = match event.assertion {
            Assertion::Occur => (self.occur(event, now), None),
            Assertion::Recover => self.recover(event, now),
        };

        if let Some(job) = job {
            self.deletions.schedule(job);
        }

        trace!(
            node = %event.node_name,
            fault = %event.fault_key,
            assertion = %event.assertion,
            ?transition,
            "fault event applied"
        );
        transition
    }

    /// Apply every event of a validated report in order
    pub fn apply_all<'a, I>(&self, events: I) -> Vec<Transition>
    where
        I: IntoIterator<Item = &'a FaultEvent>,
    {
        events.into_iter().map(|event| self.apply(event)).collect()
    }

    fn occur(&self, event: &FaultEvent, now: Instant) -> Transition {
        let mut nodes = self.nodes.write();
        let faults = nodes.entry(event.node_name.clone()).or_default();

        if let Some(entry) = faults.get_mut(&event.fault_key) {
            return if entry.pending.take().is_some() {
                debug!(node = %event.node_name, fault = %event.fault_key, "pending deletion cancelled");
                Transition::DeletionCancelled
            } else {
                Transition::Duplicate
            };
        }

        faults.insert(
            event.fault_key.clone(),
            Entry {
                record: FaultRecord {
                    node_name: event.node_name.clone(),
                    fault_key: event.fault_key.clone(),
                    fault_type: event.fault_type,
                    fault_code: event.fault_code.clone(),
                    level: event.level,
                    device_ids: event.device_ids.clone(),
                    fault_time: event.fault_time,
                    added_at: Utc::now(),
                    pending_delete: false,
                },
                added: now,
                pending: None,
            },
        );
        debug!(node = %event.node_name, fault = %event.fault_key, level = %event.level, "fault active");
        Transition::Created
    }

    fn recover(&self, event: &FaultEvent, now: Instant) -> (Transition, Option<DeletionJob>) {
        let mut nodes = self.nodes.write();

        let Some(faults) = nodes.get_mut(&event.node_name) else {
            let delete_at = now + self.grace;
            return (
                Transition::OrphanScheduled { delete_at },
                Some(self.job(event, delete_at, self.fresh_ticket())),
            );
        };

        let Some(entry) = faults.get_mut(&event.fault_key) else {
            let delete_at = now + self.grace;
            return (
                Transition::OrphanScheduled { delete_at },
                Some(self.job(event, delete_at, self.fresh_ticket())),
            );
        };

        if now.saturating_duration_since(entry.added) >= self.grace {
            faults.remove(&event.fault_key);
            if faults.is_empty() {
                nodes.remove(&event.node_name);
            }
            debug!(node = %event.node_name, fault = %event.fault_key, "fault recovered");
            return (Transition::Removed, None);
        }

        let ticket = self.fresh_ticket();
        entry.pending = Some(ticket);
        let delete_at = entry.added + self.grace;
        (
            Transition::DeletionScheduled { delete_at },
            Some(self.job(event, delete_at, ticket)),
        )
    }

    fn job(&self, event: &FaultEvent, delete_at: Instant, ticket: u64) -> DeletionJob {
        DeletionJob {
            delete_at,
            node_name: event.node_name.clone(),
            fault_key: event.fault_key.clone(),
            ticket,
        }
    }

    fn fresh_ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::Relaxed)
    }

    /// Execute a due deletion job; true if it removed an entry
    pub fn execute(&self, job: &DeletionJob) -> bool {
        let mut nodes = self.nodes.write();
        let Some(faults) = nodes.get_mut(&job.node_name) else {
            return false;
        };

        let matches = faults
            .get(&job.fault_key)
            .is_some_and(|entry| entry.pending == Some(job.ticket));
        if !matches {
            return false;
        }

        faults.remove(&job.fault_key);
        if faults.is_empty() {
            nodes.remove(&job.node_name);
        }
        debug!(node = %job.node_name, fault = %job.fault_key, "fault removed after grace period");
        true
    }

    pub fn contains(&self, node_name: &str, fault_key: &str) -> bool {
        self.nodes
            .read()
            .get(node_name)
            .is_some_and(|faults| faults.contains_key(fault_key))
    }

    /// Active faults on one node, sorted by fault key
    pub fn faults_on(&self, node_name: &str) -> Vec<FaultRecord> {
        let nodes = self.nodes.read();
        let mut records: Vec<FaultRecord> = nodes
            .get(node_name)
            .map(|faults| faults.values().map(Entry::view).collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.fault_key.cmp(&b.fault_key));
        records
    }

    /// Every active fault grouped by node
    pub fn snapshot(&self) -> BTreeMap<String, Vec<FaultRecord>> {
        let nodes = self.nodes.read();
        nodes
            .iter()
            .map(|(node, faults)| {
                let mut records: Vec<FaultRecord> = faults.values().map(Entry::view).collect();
                records.sort_by(|a, b| a.fault_key.cmp(&b.fault_key));
                (node.clone(), records)
            })
            .collect()
    }

    /// Total active entries
    pub fn len(&self) -> usize {
        self.nodes.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }
}

impl std::fmt::Debug for FaultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultCache")
            .field("grace", &self.grace)
            .field("entries", &self.len())
            .finish()
    }
}

//! Topology Publisher: the reconciliation loop
//!
//! Ingestion records superpod changes in the [`EventMap`]; this loop drains them
//! in bounded batches and pushes the current snapshot of each superpod to every
//! configured store. Stores skip unchanged content through their publish logs.
//! A failed store puts the superpod back for the next cycle.

use crate::error::StoreError;
use crate::topology::events::EventMap;
use crate::topology::model::{NodeDevice, Operator, SuperPodDevice};
use crate::topology::sink::ChecksumGatedStore;
use crate::topology::store::TopologyStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default cycle interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Default events drained per cycle
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Counters for one reconciliation cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub processed: usize,
    pub written: usize,
    pub skipped: usize,
    pub removed: usize,
    pub requeued: usize,
}

impl CycleStats {
    pub fn summary(&self) -> String {
        format!(
            "{} processed, {} written, {} unchanged, {} removed, {} requeued",
            self.processed, self.written, self.skipped, self.removed, self.requeued
        )
    }
}

pub struct TopologyPublisher {
    topology: Arc<TopologyStore>,
    events: Arc<EventMap>,
    stores: Vec<Arc<ChecksumGatedStore>>,
    interval: Duration,
    batch_size: usize,
}

impl TopologyPublisher {
    pub fn new(
        topology: Arc<TopologyStore>,
        events: Arc<EventMap>,
        stores: Vec<Arc<ChecksumGatedStore>>,
    ) -> Self {
        Self {
            topology,
            events,
            stores,
            interval: DEFAULT_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Add or replace a node and queue its superpod(s)
    pub fn observe_node(&self, super_pod_id: &str, node: NodeDevice) {
        for (id, operator) in self.topology.upsert_node(super_pod_id, node) {
            self.events.record(&id, operator);
        }
    }

    /// Remove a node and queue its superpod; false if the node was unknown
    pub fn remove_node(&self, node_name: &str) -> bool {
        match self.topology.delete_node(node_name) {
            Some((id, operator)) => {
                self.events.record(&id, operator);
                true
            }
            None => false,
        }
    }

    pub fn events(&self) -> &Arc<EventMap> {
        &self.events
    }

    pub fn topology(&self) -> &Arc<TopologyStore> {
        &self.topology
    }

    /// Force-write every known superpod to every store.
    ///
    /// Failures are queued for the ordinary retry path.
    pub async fn initial_sync(&self) -> CycleStats {
        let mut stats = CycleStats::default();

        for id in self.topology.super_pod_ids() {
            let Some(pod) = self.topology.get(&id) else {
                continue;
            };
            stats.processed += 1;

            match self.publish(&pod, true, &mut stats).await {
                Ok(()) => {}
                Err(e) => {
                    warn!(super_pod_id = %id, error = %e, "initial sync failed, queued for retry");
                    if self.events.requeue(&id, Operator::Update) {
                        stats.requeued += 1;
                    }
                }
            }
        }

        info!("initial topology sync: {}", stats.summary());
        stats
    }

    /// Run one reconciliation cycle over at most `batch_size` events
    pub async fn reconcile_once(&self) -> CycleStats {
        let mut stats = CycleStats::default();
        let batch = self.events.drain(self.batch_size);

        for (id, operator) in batch {
            stats.processed += 1;

            let result = match operator {
                Operator::Add | Operator::Update => match self.topology.get(&id) {
                    Some(pod) => self.publish(&pod, false, &mut stats).await,
                    None => {
                        debug!(super_pod_id = %id, "superpod vanished, removing");
                        self.unpublish(&id, &mut stats).await
                    }
                },
                Operator::Delete => self.unpublish(&id, &mut stats).await,
            };

            if let Err(e) = result {
                let requeued = self.events.requeue(&id, operator);
                if requeued {
                    stats.requeued += 1;
                }
                warn!(
                    super_pod_id = %id,
                    %operator,
                    requeued,
                    error = %e,
                    "reconciliation failed"
                );
            }
        }

        if stats.processed > 0 {
            debug!("reconcile cycle: {}", stats.summary());
        }
        stats
    }

    /// Initial sync, then a cycle every interval until `cancel` fires
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            batch_size = self.batch_size,
            stores = self.stores.len(),
            "topology publisher started"
        );

        self.initial_sync().await;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.reconcile_once().await;
                }
            }
        }

        info!(pending = self.events.len(), "topology publisher stopped");
    }

    /// Write a snapshot to every store; the first error is returned after all stores were tried
    async fn publish(
        &self,
        pod: &SuperPodDevice,
        force: bool,
        stats: &mut CycleStats,
    ) -> Result<(), StoreError> {
        let payload = pod.to_payload()?;
        let checksum = pod.checksum()?;
        let mut first_error = None;

        for store in &self.stores {
            let outcome = if force {
                store
                    .write_forced(&pod.super_pod_id, &checksum, &payload)
                    .await
                    .map(|()| true)
            } else {
                store.write(&pod.super_pod_id, &checksum, &payload).await
            };

            match outcome {
                Ok(true) => stats.written += 1,
                Ok(false) => stats.skipped += 1,
                Err(e) => {
                    warn!(store = store.name(), super_pod_id = %pod.super_pod_id, error = %e, "store write failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    async fn unpublish(&self, super_pod_id: &str, stats: &mut CycleStats) -> Result<(), StoreError> {
        let mut first_error = None;

        for store in &self.stores {
            match store.remove(super_pod_id).await {
                Ok(()) => stats.removed += 1,
                Err(e) => {
                    warn!(store = store.name(), super_pod_id, error = %e, "store removal failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

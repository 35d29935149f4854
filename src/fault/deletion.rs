//! Delayed fault deletion
//!
//! Recovered faults are removed after a grace deadline. Jobs wait in a
//! deadline-ordered queue and a single worker executes them against the cache
//! as they come due.

use crate::fault::cache::FaultCache;
use parking_lot::Mutex;
use podwatch_core_resilience::DeadlineQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default worker wait when the queue is empty
pub const DEFAULT_IDLE_POLL: Duration = Duration::from_millis(500);

/// A pending removal of one cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionJob {
    pub delete_at: Instant,
    pub node_name: String,
    pub fault_key: String,
    /// Must match the entry's pending ticket for the removal to take effect
    pub ticket: u64,
}

/// Deadline-ordered job queue shared by the cache (producer) and the worker
#[derive(Debug)]
pub struct DeletionQueue {
    jobs: Mutex<DeadlineQueue<DeletionJob>>,
    wake: Notify,
    idle_poll: Duration,
}

impl DeletionQueue {
    pub fn new(idle_poll: Duration) -> Self {
        Self {
            jobs: Mutex::new(DeadlineQueue::new()),
            wake: Notify::new(),
            idle_poll,
        }
    }

    /// Enqueue a job and wake the worker so it can re-evaluate its sleep
    pub fn schedule(&self, job: DeletionJob) {
        self.jobs.lock().push(job.delete_at, job);
        self.wake.notify_one();
    }

    /// Pop the earliest job if it is due at `now`
    pub fn pop_due(&self, now: Instant) -> Option<DeletionJob> {
        self.jobs.lock().pop_due(now)
    }

    /// Every job due at `now`, earliest first
    pub fn drain_due(&self, now: Instant) -> Vec<DeletionJob> {
        let mut jobs = self.jobs.lock();
        std::iter::from_fn(|| jobs.pop_due(now)).collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.jobs.lock().next_deadline()
    }

    /// Abandon all queued jobs
    pub fn clear(&self) -> usize {
        self.jobs.lock().clear()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    pub fn idle_poll(&self) -> Duration {
        self.idle_poll
    }

    async fn notified(&self) {
        self.wake.notified().await
    }
}

impl Default for DeletionQueue {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_POLL)
    }
}

/// Background task executing due deletion jobs
pub struct DeletionWorker {
    queue: Arc<DeletionQueue>,
    cache: Arc<FaultCache>,
}

impl DeletionWorker {
    pub fn new(queue: Arc<DeletionQueue>, cache: Arc<FaultCache>) -> Self {
        Self { queue, cache }
    }

    /// Execute every job due now; returns how many removed an entry
    pub fn run_due(&self) -> usize {
        self.queue
            .drain_due(Instant::now())
            .iter()
            .filter(|job| self.cache.execute(job))
            .count()
    }

    /// Run until `cancel` fires. Queued jobs are dropped on exit.
    pub async fn run(self, cancel: CancellationToken) {
        info!("deletion worker started");

        loop {
            let removed = self.run_due();
            if removed > 0 {
                debug!(removed, "executed due deletions");
            }

            let wake_at = self
                .queue
                .next_deadline()
                .unwrap_or_else(|| Instant::now() + self.queue.idle_poll());

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.queue.notified() => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }

        let abandoned = self.queue.clear();
        info!(abandoned, "deletion worker stopped");
    }
}

//! Background push-back of edited transforms.
//!
//! Edits enqueue into a bounded channel and never wait on the network. A
//! dedicated task drains the channel and posts each update to the catalog.
//! Outcomes are counted so that failures and backpressure stay visible.

use crate::{catalog::CatalogClient, transform::RowMajor};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// One transform update bound for the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct PushRequest {
    pub id: String,
    pub matrix: RowMajor,
}

/// Push-back counters
#[derive(Debug, Default)]
pub struct PushStats {
    pub queued: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub dropped: AtomicU64,
}

/// Point-in-time copy of `PushStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushSnapshot {
    pub queued: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl PushStats {
    pub fn snapshot(&self) -> PushSnapshot {
        PushSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Print counters to the log
    pub fn print_stats(&self) {
        let snapshot = self.snapshot();
        info!(
            "Pushes queued: {} | Succeeded: {} | Failed: {} | Dropped: {}",
            snapshot.queued, snapshot.succeeded, snapshot.failed, snapshot.dropped,
        );
    }
}

/// Producer side of the push-back channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PushQueue {
    sender: mpsc::Sender<PushRequest>,
    stats: Arc<PushStats>,
}

impl PushQueue {
    /// Creates a queue holding at most `capacity` pending updates, returning
    /// the receiving end for whoever drains it.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<PushRequest>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let queue = Self {
            sender,
            stats: Arc::new(PushStats::default()),
        };
        (queue, receiver)
    }

    /// Queues an update without waiting. Returns `false` when it was dropped
    /// because the queue is full or the worker is gone.
    pub fn enqueue(&self, request: PushRequest) -> bool {
        match self.sender.try_send(request) {
            Ok(()) => {
                self.stats.queued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(request)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(id = %request.id, "push-back queue full, dropping update");
                false
            }
            Err(TrySendError::Closed(request)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(id = %request.id, "push-back worker stopped, dropping update");
                false
            }
        }
    }

    pub fn stats(&self) -> Arc<PushStats> {
        self.stats.clone()
    }
}

/// Spawns the push-back worker on the current tokio runtime.
pub fn spawn_push_worker(client: Arc<CatalogClient>, capacity: usize) -> (PushQueue, JoinHandle<()>) {
    let (queue, receiver) = PushQueue::bounded(capacity);
    let handle = tokio::spawn(run_push_worker(client, receiver, queue.stats()));
    (queue, handle)
}

/// Drains `receiver` until every sender is gone. Failures are counted and
/// logged, never retried.
pub async fn run_push_worker(
    client: Arc<CatalogClient>,
    mut receiver: mpsc::Receiver<PushRequest>,
    stats: Arc<PushStats>,
) {
    while let Some(request) = receiver.recv().await {
        match client.push_transform(&request.id, &request.matrix).await {
            Ok(()) => {
                stats.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "transform push failed");
            }
        }
    }
    debug!("push-back worker exited");
}

/// Start push statistics reporting task
pub async fn start_push_reporter(stats: Arc<PushStats>, period: Duration) {
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;
        stats.print_stats();
    }
}

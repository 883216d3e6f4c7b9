//! Partitioned sequential workers.
//!
//! A partition key is hashed onto one of N bounded queues, and each queue
//! is drained by exactly one task. Messages sharing a key are therefore
//! handled strictly in submission order, while different partitions run
//! concurrently.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use threadline_core::error::DomainError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Handles one raw message. Failures are the handler's to report.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles `payload` to completion.
    async fn handle(&self, payload: Vec<u8>);
}

/// Cloneable submit side of a [`PartitionedWorkers`] pool.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    name: &'static str,
    senders: Arc<[mpsc::Sender<Vec<u8>>]>,
}

impl WorkerHandle {
    /// Number of partitions.
    #[must_use]
    pub fn partitions(&self) -> usize {
        self.senders.len()
    }

    /// Whether every partition still accepts messages. Turns false once the
    /// pool shuts down or a worker dies.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.senders.iter().all(|sender| !sender.is_closed())
    }

    /// The partition `key` maps to.
    #[must_use]
    pub fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let partitions = self.senders.len() as u64;
        // The remainder is below the partition count, which is a usize.
        usize::try_from(hasher.finish() % partitions).unwrap_or(0)
    }

    /// Enqueues `payload` on the partition owned by `key`, waiting while
    /// that queue is full.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Transport` if the pool has shut down.
    pub async fn submit(&self, key: &str, payload: Vec<u8>) -> Result<(), DomainError> {
        let partition = self.partition_for(key);
        self.senders[partition]
            .send(payload)
            .await
            .map_err(|_| DomainError::Transport(format!("{} workers are shut down", self.name)))
    }
}

/// A pool of per-partition sequential workers.
#[derive(Debug)]
pub struct PartitionedWorkers {
    handle: WorkerHandle,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl PartitionedWorkers {
    /// Spawns `partitions` workers, each with a queue of `queue_depth`
    /// messages, all feeding `handler`. Both sizes are clamped to at
    /// least one.
    #[must_use]
    pub fn spawn(
        name: &'static str,
        partitions: usize,
        queue_depth: usize,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut senders = Vec::with_capacity(partitions.max(1));
        let mut tasks = Vec::with_capacity(partitions.max(1));

        for partition in 0..partitions.max(1) {
            let (tx, rx) = mpsc::channel(queue_depth.max(1));
            senders.push(tx);
            tasks.push(tokio::spawn(run_partition(
                name,
                partition,
                rx,
                Arc::clone(&handler),
                shutdown_rx.clone(),
            )));
        }
        info!(name, partitions = senders.len(), "Started partitioned workers");

        Self {
            handle: WorkerHandle {
                name,
                senders: senders.into(),
            },
            shutdown,
            tasks,
        }
    }

    /// Returns a cloneable submit handle.
    #[must_use]
    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Stops accepting messages, lets every worker drain what is already
    /// queued, and waits for all of them to finish.
    ///
    /// Returns the number of partitions whose worker had died, each of
    /// which is logged.
    pub async fn shutdown(self) -> usize {
        let name = self.handle.name;
        // Workers that already exited have dropped their receivers.
        let _ = self.shutdown.send(true);
        let mut failed = 0;
        for (partition, task) in self.tasks.into_iter().enumerate() {
            if let Err(e) = task.await {
                failed += 1;
                error!(name, partition, error = %e, "Partition worker failed");
            }
        }
        info!(name, failed, "Partitioned workers stopped");
        failed
    }
}

async fn run_partition(
    name: &'static str,
    partition: usize,
    mut rx: mpsc::Receiver<Vec<u8>>,
    handler: Arc<dyn MessageHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(payload) => handler.handle(payload).await,
                None => break,
            },
            _ = shutdown.changed() => {
                rx.close();
                while let Some(payload) = rx.recv().await {
                    handler.handle(payload).await;
                }
                break;
            }
        }
    }
    debug!(name, partition, "Partition worker stopped");
}

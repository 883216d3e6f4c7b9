//! Outbox service: persist a reduction atomically, then publish and retire
//! its side effects.
//!
//! `transact` is the durability boundary. Once it returns, every outbox
//! record is delivered eventually: immediately by
//! [`OutboxService::persist_and_dispatch`], or later by
//! [`OutboxService::redeliver_pending`] if a publish or delete fails or the
//! process dies first. Consumers dedupe by record id.

use std::sync::Arc;
use std::time::Duration;

use threadline_core::bus::{MessagePublisher, Topics};
use threadline_core::clock::Clock;
use threadline_core::error::DomainError;
use threadline_core::event::DomainChangeEnvelope;
use threadline_core::ids::IdGenerator;
use threadline_core::outbox::{OutboxEffect, OutboxRecord};
use threadline_core::reduction::ReductionResult;
use threadline_core::repository::{DomainRepository, OutboxStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Counts from one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Records a publish was attempted for.
    pub attempted: usize,
    /// Records the bus accepted.
    pub published: usize,
    /// Records deleted after publishing.
    pub retired: usize,
}

impl DispatchReport {
    /// Records left pending by this pass.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.attempted - self.retired
    }
}

/// Persists reductions and dispatches their outbox records.
pub struct OutboxService {
    repository: Arc<dyn DomainRepository>,
    outbox_store: Arc<dyn OutboxStore>,
    publisher: Arc<dyn MessagePublisher>,
    topics: Topics,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl OutboxService {
    /// Creates a new `OutboxService`.
    #[must_use]
    pub fn new(
        repository: Arc<dyn DomainRepository>,
        outbox_store: Arc<dyn OutboxStore>,
        publisher: Arc<dyn MessagePublisher>,
        topics: Topics,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            repository,
            outbox_store,
            publisher,
            topics,
            clock,
            ids,
        }
    }

    /// Wraps every domain event in a domain-change record, writes events,
    /// snapshots and all outbox records in one transaction, then dispatches
    /// the records. Handler records are dispatched before domain changes.
    ///
    /// Dispatch failures are logged and leave the record pending; they do
    /// not fail the call.
    ///
    /// # Errors
    ///
    /// Returns the repository's error if the transaction fails, in which
    /// case nothing was written and nothing is dispatched.
    pub async fn persist_and_dispatch(
        &self,
        result: ReductionResult,
    ) -> Result<DispatchReport, DomainError> {
        if result.is_empty() {
            return Ok(DispatchReport::default());
        }

        let now = self.clock.now_millis();
        let mut records = result.outbox_records;
        records.extend(result.domain_events.iter().map(|event| {
            OutboxRecord::domain_change(
                self.ids.next_id(),
                now,
                DomainChangeEnvelope::wrap(self.ids.next_id(), now, event.clone()),
            )
        }));

        self.repository
            .transact(&result.domain_events, &result.snapshots, &records)
            .await?;
        info!(
            events = result.domain_events.len(),
            snapshots = result.snapshots.len(),
            outbox = records.len(),
            "Persisted domain events, snapshots and outbox records"
        );

        Ok(self.dispatch(&records).await)
    }

    /// Publishes each record to its topic and deletes it once accepted.
    pub async fn dispatch(&self, records: &[OutboxRecord]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for record in records {
            report.attempted += 1;
            let (topic, message) = match &record.effect {
                OutboxEffect::Echo(envelope) => (&self.topics.outbox, serde_json::to_value(envelope)),
                OutboxEffect::DomainChange(change) => {
                    (&self.topics.domain_changes, serde_json::to_value(change))
                }
            };
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "Outbox record could not be serialized");
                    continue;
                }
            };

            if let Err(e) = self.publisher.publish(topic, record.partition_key(), &message).await {
                warn!(record_id = %record.id, topic = %topic, error = %e, "Outbox publish failed; record left pending");
                continue;
            }
            report.published += 1;
            debug!(record_id = %record.id, record_type = record.record_type(), topic = %topic, "Published outbox record");

            match self.outbox_store.delete_outbox_record(&record.id).await {
                Ok(()) => {
                    report.retired += 1;
                    debug!(record_id = %record.id, "Deleted outbox record");
                }
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "Outbox delete failed; record will be republished");
                }
            }
        }
        report
    }

    /// Dispatches up to `limit` records still pending in the store, oldest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns the store's error if pending records cannot be listed.
    pub async fn redeliver_pending(&self, limit: u32) -> Result<DispatchReport, DomainError> {
        let pending = self.outbox_store.pending_outbox_records(limit).await?;
        if pending.is_empty() {
            return Ok(DispatchReport::default());
        }
        info!(count = pending.len(), "Redelivering pending outbox records");
        Ok(self.dispatch(&pending).await)
    }

    /// Runs [`redeliver_pending`](Self::redeliver_pending) immediately and
    /// then every `interval` until `shutdown` flips or its sender is dropped.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        batch: u32,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.redeliver_pending(batch).await {
                            Ok(report) if report.attempted > 0 => {
                                info!(
                                    attempted = report.attempted,
                                    retired = report.retired,
                                    "Outbox sweep finished"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "Outbox sweep failed"),
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Outbox sweeper stopped");
        })
    }
}

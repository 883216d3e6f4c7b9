//! Test repositories — failure-injecting `DomainRepository` and
//! `OutboxStore` implementations for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use threadline_core::aggregate::AggregateKey;
use threadline_core::error::DomainError;
use threadline_core::event::{DomainEventEnvelope, MessageEnvelope};
use threadline_core::outbox::OutboxRecord;
use threadline_core::repository::{
    DomainRepository, ListThreadMessagesQuery, ListThreadsQuery, OutboxStore, Page,
};
use threadline_core::snapshot::{AggregateSnapshot, ThreadSnapshot};

/// A domain repository that always returns an infrastructure error. Useful
/// for testing error-handling paths.
#[derive(Debug)]
pub struct FailingDomainRepository;

fn unavailable() -> DomainError {
    DomainError::Infrastructure("connection refused".into())
}

#[async_trait]
impl DomainRepository for FailingDomainRepository {
    async fn load_snapshot(
        &self,
        _key: &AggregateKey,
    ) -> Result<Option<AggregateSnapshot>, DomainError> {
        Err(unavailable())
    }

    async fn list_threads(
        &self,
        _query: &ListThreadsQuery,
    ) -> Result<Page<ThreadSnapshot>, DomainError> {
        Err(unavailable())
    }

    async fn list_thread_messages(
        &self,
        _query: &ListThreadMessagesQuery,
    ) -> Result<Page<MessageEnvelope>, DomainError> {
        Err(unavailable())
    }

    async fn transact(
        &self,
        _events: &[DomainEventEnvelope],
        _snapshots: &[AggregateSnapshot],
        _outbox: &[OutboxRecord],
    ) -> Result<(), DomainError> {
        Err(unavailable())
    }
}

/// Wraps an outbox store and fails the first `failures` deletes.
pub struct FlakyOutboxStore {
    inner: Arc<dyn OutboxStore>,
    remaining_failures: AtomicUsize,
}

impl FlakyOutboxStore {
    /// Create a wrapper whose first `failures` deletes fail.
    #[must_use]
    pub fn new(inner: Arc<dyn OutboxStore>, failures: usize) -> Self {
        Self {
            inner,
            remaining_failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl OutboxStore for FlakyOutboxStore {
    async fn delete_outbox_record(&self, record_id: &str) -> Result<(), DomainError> {
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(unavailable());
        }
        self.inner.delete_outbox_record(record_id).await
    }

    async fn pending_outbox_records(&self, limit: u32) -> Result<Vec<OutboxRecord>, DomainError> {
        self.inner.pending_outbox_records(limit).await
    }
}

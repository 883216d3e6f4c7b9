//! Domain repository and outbox store abstractions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateKey;
use crate::error::DomainError;
use crate::event::{DomainEventEnvelope, MessageEnvelope};
use crate::outbox::OutboxRecord;
use crate::snapshot::{AggregateSnapshot, ServerSnapshot, ThreadSnapshot, UserSnapshot};

/// Page size used when a query does not name one.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Sort order for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest first.
    Asc,
    /// Largest first.
    #[default]
    Desc,
}

/// Scan direction over an ordered log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Chronological.
    Forward,
    /// Most recent first.
    Backward,
}

/// Arguments of [`DomainRepository::list_threads`].
#[derive(Debug, Clone, Default)]
pub struct ListThreadsQuery {
    /// Only threads owned by this user are returned.
    pub user_id: String,
    /// Page size; defaults to [`DEFAULT_PAGE_LIMIT`].
    pub limit: Option<u32>,
    /// Opaque cursor returned by a previous page.
    pub cursor: Option<String>,
    /// Numeric snapshot field to sort the page by; defaults to `updatedAt`.
    pub sort: Option<String>,
    /// Sort order; defaults to descending.
    pub order: Option<SortOrder>,
    /// Exact-match constraints on top-level snapshot fields.
    pub filter: BTreeMap<String, String>,
}

impl ListThreadsQuery {
    /// A first-page query for `user_id` with default options.
    #[must_use]
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// The effective page size.
    #[must_use]
    pub fn page_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1)
    }
}

/// Arguments of [`DomainRepository::list_thread_messages`].
#[derive(Debug, Clone, Default)]
pub struct ListThreadMessagesQuery {
    /// The thread whose history is read.
    pub thread_id: String,
    /// Page size; defaults to [`DEFAULT_PAGE_LIMIT`].
    pub limit: Option<u32>,
    /// Opaque cursor returned by a previous page.
    pub cursor: Option<String>,
    /// Scan direction. Takes precedence over `order`.
    pub direction: Option<Direction>,
    /// Legacy ordering hint; `Desc` means backward.
    pub order: Option<SortOrder>,
}

impl ListThreadMessagesQuery {
    /// A first-page chronological query for `thread_id`.
    #[must_use]
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            ..Self::default()
        }
    }

    /// The effective page size.
    #[must_use]
    pub fn page_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1)
    }

    /// `true` when the scan runs chronologically.
    #[must_use]
    pub fn scan_forward(&self) -> bool {
        match self.direction {
            Some(direction) => direction == Direction::Forward,
            None => self.order != Some(SortOrder::Desc),
        }
    }
}

/// One page of a paginated read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Cursor for the next page; absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Persistence over aggregate snapshots and the append-only event log.
#[async_trait]
pub trait DomainRepository: Send + Sync {
    /// Returns the highest-versioned snapshot for `key`, or `None`.
    async fn load_snapshot(&self, key: &AggregateKey)
    -> Result<Option<AggregateSnapshot>, DomainError>;

    /// Returns the latest server snapshot.
    async fn load_server(&self, server_id: &str) -> Result<Option<ServerSnapshot>, DomainError> {
        match self.load_snapshot(&AggregateKey::server(server_id)).await? {
            Some(AggregateSnapshot::Server(snapshot)) => Ok(Some(snapshot)),
            Some(other) => Err(shape_mismatch(&other)),
            None => Ok(None),
        }
    }

    /// Returns the latest user snapshot.
    async fn load_user(&self, user_id: &str) -> Result<Option<UserSnapshot>, DomainError> {
        match self.load_snapshot(&AggregateKey::user(user_id)).await? {
            Some(AggregateSnapshot::User(snapshot)) => Ok(Some(snapshot)),
            Some(other) => Err(shape_mismatch(&other)),
            None => Ok(None),
        }
    }

    /// Returns the latest thread snapshot.
    async fn load_thread(&self, thread_id: &str) -> Result<Option<ThreadSnapshot>, DomainError> {
        match self.load_snapshot(&AggregateKey::thread(thread_id)).await? {
            Some(AggregateSnapshot::Thread(snapshot)) => Ok(Some(snapshot)),
            Some(other) => Err(shape_mismatch(&other)),
            None => Ok(None),
        }
    }

    /// Lists the latest snapshots of threads owned by a user.
    async fn list_threads(
        &self,
        query: &ListThreadsQuery,
    ) -> Result<Page<ThreadSnapshot>, DomainError>;

    /// Lists the messages recorded in one thread's event log.
    async fn list_thread_messages(
        &self,
        query: &ListThreadMessagesQuery,
    ) -> Result<Page<MessageEnvelope>, DomainError>;

    /// Atomically writes events, snapshots and outbox records. Returns
    /// immediately when all three are empty.
    ///
    /// Each event write is conditioned on its id not existing yet; a
    /// duplicate fails the whole write with
    /// `DomainError::TransactionConflict`. A snapshot version that already
    /// exists fails it with `DomainError::ConcurrencyConflict`.
    async fn transact(
        &self,
        events: &[DomainEventEnvelope],
        snapshots: &[AggregateSnapshot],
        outbox: &[OutboxRecord],
    ) -> Result<(), DomainError>;
}

/// Access to outbox records after their transaction has committed.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Retires a record. Deleting an absent record succeeds.
    async fn delete_outbox_record(&self, record_id: &str) -> Result<(), DomainError>;

    /// Returns up to `limit` undelivered records, oldest first.
    async fn pending_outbox_records(&self, limit: u32) -> Result<Vec<OutboxRecord>, DomainError>;
}

fn shape_mismatch(snapshot: &AggregateSnapshot) -> DomainError {
    DomainError::Infrastructure(format!(
        "stored snapshot for {} has the wrong shape",
        snapshot.key()
    ))
}

//! In-memory implementation of the domain store.
//!
//! Holds the same partition/sort key layout as the `PostgreSQL` store and
//! enforces the same write conditions, so pipeline behavior observed
//! against it carries over.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use threadline_core::aggregate::AggregateKey;
use threadline_core::error::DomainError;
use threadline_core::event::{DomainEventEnvelope, MessageEnvelope, THREAD_MESSAGE_ADDED};
use threadline_core::outbox::OutboxRecord;
use threadline_core::repository::{
    DomainRepository, ListThreadMessagesQuery, ListThreadsQuery, OutboxStore, Page,
};
use threadline_core::snapshot::{AggregateSnapshot, ThreadSnapshot};

use crate::cursor::{self, CursorKey};
use crate::keys;
use crate::listing::{self, DEFAULT_SORT_FIELD};

#[derive(Debug, Default)]
struct State {
    /// pk -> sk -> event
    events: BTreeMap<String, BTreeMap<String, DomainEventEnvelope>>,
    event_ids: HashSet<String>,
    /// pk -> sk -> snapshot
    snapshots: BTreeMap<String, BTreeMap<String, AggregateSnapshot>>,
    outbox: BTreeMap<String, OutboxRecord>,
}

/// Domain store kept entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryDomainRepository {
    state: Mutex<State>,
}

impl MemoryDomainRepository {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the event log of one aggregate in sort-key order.
    #[must_use]
    pub fn events_for(&self, key: &AggregateKey) -> Vec<DomainEventEnvelope> {
        self.lock()
            .events
            .get(&keys::aggregate_pk(key))
            .map(|log| log.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the total number of stored events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.lock().event_ids.len()
    }

    /// Returns every stored snapshot version of one aggregate, ascending.
    #[must_use]
    pub fn snapshot_versions(&self, key: &AggregateKey) -> Vec<i64> {
        self.lock()
            .snapshots
            .get(&keys::aggregate_pk(key))
            .map(|versions| versions.values().map(AggregateSnapshot::version).collect())
            .unwrap_or_default()
    }

    /// Returns every undelivered outbox record, oldest first.
    #[must_use]
    pub fn outbox_records(&self) -> Vec<OutboxRecord> {
        let mut records: Vec<_> = self.lock().outbox.values().cloned().collect();
        records.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        records
    }
}

#[async_trait]
impl DomainRepository for MemoryDomainRepository {
    async fn load_snapshot(
        &self,
        key: &AggregateKey,
    ) -> Result<Option<AggregateSnapshot>, DomainError> {
        Ok(self
            .lock()
            .snapshots
            .get(&keys::aggregate_pk(key))
            .and_then(|versions| versions.values().next_back().cloned()))
    }

    async fn list_threads(
        &self,
        query: &ListThreadsQuery,
    ) -> Result<Page<ThreadSnapshot>, DomainError> {
        let after = query.cursor.as_deref().map(cursor::decode).transpose()?;
        let limit = query.page_limit() as usize;

        let mut page = Vec::with_capacity(limit);
        let mut has_more = false;
        {
            let state = self.lock();
            for (pk, versions) in &state.snapshots {
                if after.as_ref().is_some_and(|c| pk.as_str() <= c.pk.as_str()) {
                    continue;
                }
                let Some(AggregateSnapshot::Thread(thread)) = versions.values().next_back() else {
                    continue;
                };
                if thread.user_id != query.user_id || !listing::matches_filter(thread, &query.filter)? {
                    continue;
                }
                if page.len() == limit {
                    has_more = true;
                    break;
                }
                page.push((pk.clone(), thread.clone()));
            }
        }

        let cursor = match (has_more, page.last()) {
            (true, Some((pk, _))) => Some(cursor::encode(&CursorKey {
                pk: pk.clone(),
                sk: None,
            })?),
            _ => None,
        };
        let mut items: Vec<ThreadSnapshot> = page.into_iter().map(|(_, thread)| thread).collect();
        listing::sort_threads(
            &mut items,
            query.sort.as_deref().unwrap_or(DEFAULT_SORT_FIELD),
            query.order.unwrap_or_default(),
        );
        Ok(Page { items, cursor })
    }

    async fn list_thread_messages(
        &self,
        query: &ListThreadMessagesQuery,
    ) -> Result<Page<MessageEnvelope>, DomainError> {
        let pk = keys::aggregate_pk(&AggregateKey::thread(query.thread_id.clone()));
        let after = query.cursor.as_deref().map(cursor::decode).transpose()?;
        let after_sk = match &after {
            Some(CursorKey { pk: cursor_pk, sk: Some(sk) }) if *cursor_pk == pk => Some(sk.clone()),
            Some(_) => {
                return Err(DomainError::Validation(
                    "cursor does not belong to this thread".into(),
                ));
            }
            None => None,
        };
        let limit = query.page_limit() as usize;
        let forward = query.scan_forward();

        let state = self.lock();
        let Some(log) = state.events.get(&pk) else {
            return Ok(Page {
                items: Vec::new(),
                cursor: None,
            });
        };
        let rows: Box<dyn Iterator<Item = (&String, &DomainEventEnvelope)> + '_> =
            match (forward, after_sk.as_deref()) {
                (true, Some(sk)) => Box::new(
                    log.range::<str, _>((Bound::Excluded(sk), Bound::Unbounded)),
                ),
                (true, None) => Box::new(log.iter()),
                (false, Some(sk)) => Box::new(
                    log.range::<str, _>((Bound::Unbounded, Bound::Excluded(sk)))
                        .rev(),
                ),
                (false, None) => Box::new(log.iter().rev()),
            };

        let mut items = Vec::with_capacity(limit);
        let mut last_sk = None;
        let mut has_more = false;
        for (sk, event) in rows.filter(|(_, e)| e.event_type == THREAD_MESSAGE_ADDED) {
            if items.len() == limit {
                has_more = true;
                break;
            }
            items.push(listing::message_from_payload(&event.payload)?);
            last_sk = Some(sk.clone());
        }

        let cursor = match (has_more, last_sk) {
            (true, Some(sk)) => Some(cursor::encode(&CursorKey { pk, sk: Some(sk) })?),
            _ => None,
        };
        Ok(Page { items, cursor })
    }

    async fn transact(
        &self,
        events: &[DomainEventEnvelope],
        snapshots: &[AggregateSnapshot],
        outbox: &[OutboxRecord],
    ) -> Result<(), DomainError> {
        if events.is_empty() && snapshots.is_empty() && outbox.is_empty() {
            return Ok(());
        }

        let mut state = self.lock();

        // Check every condition before applying anything.
        let mut batch_events = HashSet::new();
        for event in events {
            let pk = keys::aggregate_pk(&event.key());
            let sk = keys::event_sk(event.occurred_at, &event.event_id);
            let exists = state.event_ids.contains(&event.event_id)
                || state.events.get(&pk).is_some_and(|log| log.contains_key(&sk));
            if exists || !batch_events.insert(event.event_id.as_str()) {
                return Err(DomainError::TransactionConflict(format!(
                    "event {} already recorded",
                    event.event_id
                )));
            }
        }
        let mut batch_snapshots = HashSet::new();
        for snapshot in snapshots {
            let pk = keys::aggregate_pk(&snapshot.key());
            let sk = keys::snapshot_sk(snapshot.version());
            let exists = state
                .snapshots
                .get(&pk)
                .is_some_and(|versions| versions.contains_key(&sk));
            if exists || !batch_snapshots.insert((pk, sk)) {
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_type: snapshot.aggregate_type(),
                    aggregate_id: snapshot.aggregate_id().to_owned(),
                    version: snapshot.version(),
                });
            }
        }

        for event in events {
            state.event_ids.insert(event.event_id.clone());
            state
                .events
                .entry(keys::aggregate_pk(&event.key()))
                .or_default()
                .insert(keys::event_sk(event.occurred_at, &event.event_id), event.clone());
        }
        for snapshot in snapshots {
            state
                .snapshots
                .entry(keys::aggregate_pk(&snapshot.key()))
                .or_default()
                .insert(keys::snapshot_sk(snapshot.version()), snapshot.clone());
        }
        for record in outbox {
            state.outbox.insert(record.id.clone(), record.clone());
        }

        debug!(
            events = events.len(),
            snapshots = snapshots.len(),
            outbox = outbox.len(),
            "Committed domain transaction"
        );
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for MemoryDomainRepository {
    async fn delete_outbox_record(&self, record_id: &str) -> Result<(), DomainError> {
        self.lock().outbox.remove(record_id);
        Ok(())
    }

    async fn pending_outbox_records(&self, limit: u32) -> Result<Vec<OutboxRecord>, DomainError> {
        let mut records = self.outbox_records();
        records.truncate(limit as usize);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use threadline_core::aggregate::AggregateType;
    use threadline_core::event::EventEnvelope;
    use threadline_core::repository::{Direction, SortOrder};
    use threadline_core::snapshot::UserSnapshot;

    use super::*;

    fn thread(id: &str, user: &str, version: i64, updated_at: i64) -> AggregateSnapshot {
        AggregateSnapshot::Thread(ThreadSnapshot {
            thread_id: id.into(),
            user_id: user.into(),
            title: None,
            last_message: None,
            updated_at,
            version,
        })
    }

    fn message_event(thread_id: &str, event_id: &str, occurred_at: i64, body: &str) -> DomainEventEnvelope {
        DomainEventEnvelope {
            event_id: event_id.into(),
            occurred_at,
            aggregate_id: thread_id.into(),
            aggregate_type: AggregateType::Thread,
            event_type: THREAD_MESSAGE_ADDED.into(),
            payload: json!({
                "authorId": "u1",
                "message": { "type": "user.message", "payload": { "body": body } }
            }),
            version: None,
        }
    }

    fn echo(id: &str, created_at: i64) -> OutboxRecord {
        OutboxRecord::echo(
            id,
            created_at,
            EventEnvelope::new("ev", created_at, "assistant.message", json!({}), "s1", None),
        )
    }

    #[tokio::test]
    async fn test_load_snapshot_returns_none_when_absent() {
        let repo = MemoryDomainRepository::new();

        let loaded = repo.load_snapshot(&AggregateKey::thread("t1")).await.unwrap();

        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_load_snapshot_returns_highest_version() {
        // Arrange
        let repo = MemoryDomainRepository::new();
        repo.transact(&[], &[thread("t1", "u1", 1, 10)], &[]).await.unwrap();
        repo.transact(&[], &[thread("t1", "u1", 10, 20)], &[]).await.unwrap();
        repo.transact(&[], &[thread("t1", "u1", 2, 30)], &[]).await.unwrap();

        // Act
        let loaded = repo.load_thread("t1").await.unwrap().unwrap();

        // Assert
        assert_eq!(loaded.version, 10);
        assert_eq!(repo.snapshot_versions(&AggregateKey::thread("t1")), [1, 2, 10]);
    }

    #[tokio::test]
    async fn test_typed_loads_are_scoped_by_aggregate_type() {
        let repo = MemoryDomainRepository::new();
        let misplaced = AggregateSnapshot::User(UserSnapshot {
            user_id: "x".into(),
            threads: vec![],
            profile: threadline_core::snapshot::UserProfile::default(),
            updated_at: 1,
            version: 1,
        });
        repo.transact(&[], &[misplaced], &[]).await.unwrap();

        assert!(repo.load_user("x").await.unwrap().is_some());
        assert!(repo.load_thread("x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transact_with_nothing_is_a_no_op() {
        let repo = MemoryDomainRepository::new();

        repo.transact(&[], &[], &[]).await.unwrap();

        assert_eq!(repo.event_count(), 0);
    }

    #[tokio::test]
    async fn test_transact_rejects_duplicate_event_id_and_writes_nothing() {
        // Arrange
        let repo = MemoryDomainRepository::new();
        let event = message_event("t1", "e1", 100, "hi");
        repo.transact(&[event.clone()], &[thread("t1", "u1", 1, 100)], &[])
            .await
            .unwrap();

        // Act
        let result = repo
            .transact(&[event], &[thread("t1", "u1", 2, 200)], &[echo("o1", 200)])
            .await;

        // Assert
        assert!(matches!(result, Err(DomainError::TransactionConflict(_))));
        assert_eq!(repo.event_count(), 1);
        assert_eq!(repo.snapshot_versions(&AggregateKey::thread("t1")), [1]);
        assert!(repo.outbox_records().is_empty());
    }

    #[tokio::test]
    async fn test_transact_rejects_existing_snapshot_version() {
        let repo = MemoryDomainRepository::new();
        repo.transact(&[], &[thread("t1", "u1", 4, 100)], &[]).await.unwrap();

        let result = repo
            .transact(&[message_event("t1", "e2", 200, "x")], &[thread("t1", "u1", 4, 200)], &[])
            .await;

        match result {
            Err(DomainError::ConcurrencyConflict { aggregate_id, version, .. }) => {
                assert_eq!(aggregate_id, "t1");
                assert_eq!(version, 4);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
        assert_eq!(repo.event_count(), 0);
    }

    #[tokio::test]
    async fn test_transact_rejects_duplicate_within_one_batch() {
        let repo = MemoryDomainRepository::new();
        let event = message_event("t1", "e1", 100, "hi");

        let result = repo.transact(&[event.clone(), event], &[], &[]).await;

        assert!(matches!(result, Err(DomainError::TransactionConflict(_))));
        assert_eq!(repo.event_count(), 0);
    }

    #[tokio::test]
    async fn test_list_threads_pages_by_owner_and_sorts_descending() {
        // Arrange
        let repo = MemoryDomainRepository::new();
        repo.transact(
            &[],
            &[
                thread("a", "u1", 1, 10),
                thread("b", "u1", 1, 30),
                thread("c", "u1", 1, 20),
                thread("d", "u2", 1, 40),
            ],
            &[],
        )
        .await
        .unwrap();
        let first = ListThreadsQuery {
            limit: Some(2),
            ..ListThreadsQuery::for_user("u1")
        };

        // Act
        let page1 = repo.list_threads(&first).await.unwrap();
        let page2 = repo
            .list_threads(&ListThreadsQuery {
                cursor: page1.cursor.clone(),
                ..first
            })
            .await
            .unwrap();

        // Assert
        let ids1: Vec<_> = page1.items.iter().map(|t| t.thread_id.as_str()).collect();
        assert_eq!(ids1, ["b", "a"]);
        assert!(page1.cursor.is_some());
        let ids2: Vec<_> = page2.items.iter().map(|t| t.thread_id.as_str()).collect();
        assert_eq!(ids2, ["c"]);
        assert!(page2.cursor.is_none());
    }

    #[tokio::test]
    async fn test_list_threads_uses_latest_snapshot_and_ascending_order() {
        let repo = MemoryDomainRepository::new();
        repo.transact(&[], &[thread("a", "u1", 1, 50), thread("b", "u1", 1, 10)], &[])
            .await
            .unwrap();
        repo.transact(&[], &[thread("a", "u1", 2, 5)], &[]).await.unwrap();

        let page = repo
            .list_threads(&ListThreadsQuery {
                order: Some(SortOrder::Asc),
                ..ListThreadsQuery::for_user("u1")
            })
            .await
            .unwrap();

        assert_eq!(page.items[0].thread_id, "a");
        assert_eq!(page.items[0].version, 2);
    }

    #[tokio::test]
    async fn test_list_threads_rejects_malformed_cursor() {
        let repo = MemoryDomainRepository::new();

        let result = repo
            .list_threads(&ListThreadsQuery {
                cursor: Some("not-a-cursor!".into()),
                ..ListThreadsQuery::for_user("u1")
            })
            .await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_list_thread_messages_skips_other_event_types_and_pages() {
        // Arrange
        let repo = MemoryDomainRepository::new();
        let mut renamed = message_event("t1", "e0", 50, "");
        renamed.event_type = "thread.title-updated".into();
        repo.transact(
            &[
                renamed,
                message_event("t1", "e1", 100, "one"),
                message_event("t1", "e2", 200, "two"),
                message_event("t1", "e3", 300, "three"),
            ],
            &[],
            &[],
        )
        .await
        .unwrap();
        let first = ListThreadMessagesQuery {
            limit: Some(2),
            ..ListThreadMessagesQuery::for_thread("t1")
        };

        // Act
        let page1 = repo.list_thread_messages(&first).await.unwrap();
        let page2 = repo
            .list_thread_messages(&ListThreadMessagesQuery {
                cursor: page1.cursor.clone(),
                ..first
            })
            .await
            .unwrap();

        // Assert
        let bodies: Vec<_> = page1.items.iter().map(|m| m.payload["body"].clone()).collect();
        assert_eq!(bodies, [json!("one"), json!("two")]);
        assert_eq!(page2.items.len(), 1);
        assert_eq!(page2.items[0].payload["body"], "three");
        assert!(page2.cursor.is_none());
    }

    #[tokio::test]
    async fn test_list_thread_messages_backward_returns_newest_first() {
        let repo = MemoryDomainRepository::new();
        repo.transact(
            &[message_event("t1", "e1", 100, "one"), message_event("t1", "e2", 200, "two")],
            &[],
            &[],
        )
        .await
        .unwrap();

        let page = repo
            .list_thread_messages(&ListThreadMessagesQuery {
                direction: Some(Direction::Backward),
                ..ListThreadMessagesQuery::for_thread("t1")
            })
            .await
            .unwrap();

        assert_eq!(page.items[0].payload["body"], "two");
        assert_eq!(page.items[1].payload["body"], "one");
    }

    #[tokio::test]
    async fn test_list_thread_messages_backward_pages_with_cursor() {
        // Arrange
        let repo = MemoryDomainRepository::new();
        repo.transact(
            &[
                message_event("t1", "e1", 100, "one"),
                message_event("t1", "e2", 200, "two"),
                message_event("t1", "e3", 300, "three"),
            ],
            &[],
            &[],
        )
        .await
        .unwrap();
        let first = ListThreadMessagesQuery {
            limit: Some(2),
            direction: Some(Direction::Backward),
            ..ListThreadMessagesQuery::for_thread("t1")
        };

        // Act
        let page1 = repo.list_thread_messages(&first).await.unwrap();
        let page2 = repo
            .list_thread_messages(&ListThreadMessagesQuery {
                cursor: page1.cursor.clone(),
                ..first
            })
            .await
            .unwrap();

        // Assert
        let bodies: Vec<_> = page1.items.iter().map(|m| m.payload["body"].clone()).collect();
        assert_eq!(bodies, [json!("three"), json!("two")]);
        assert_eq!(page2.items.len(), 1);
        assert_eq!(page2.items[0].payload["body"], "one");
        assert!(page2.cursor.is_none());
    }

    #[tokio::test]
    async fn test_list_thread_messages_rejects_foreign_cursor() {
        let repo = MemoryDomainRepository::new();
        let foreign = cursor::encode(&CursorKey {
            pk: "AGG#thread#other".into(),
            sk: Some("EVENT#1".into()),
        })
        .unwrap();

        let result = repo
            .list_thread_messages(&ListThreadMessagesQuery {
                cursor: Some(foreign),
                ..ListThreadMessagesQuery::for_thread("t1")
            })
            .await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_outbox_pending_is_oldest_first_and_delete_is_idempotent() {
        // Arrange
        let repo = MemoryDomainRepository::new();
        repo.transact(&[], &[], &[echo("late", 20), echo("early", 10)])
            .await
            .unwrap();

        // Act
        let pending = repo.pending_outbox_records(10).await.unwrap();
        repo.delete_outbox_record("early").await.unwrap();
        repo.delete_outbox_record("early").await.unwrap();

        // Assert
        let ids: Vec<_> = pending.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["early", "late"]);
        assert_eq!(repo.pending_outbox_records(10).await.unwrap().len(), 1);
    }
}

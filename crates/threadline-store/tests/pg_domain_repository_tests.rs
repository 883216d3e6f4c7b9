//! Integration tests for `PgDomainRepository`.
//!
//! These need a running `PostgreSQL` (`DATABASE_URL`) and are ignored by
//! default; run them with `cargo test -- --ignored`.

use serde_json::json;
use sqlx::PgPool;
use threadline_core::aggregate::{AggregateKey, AggregateType};
use threadline_core::error::DomainError;
use threadline_core::event::{DomainEventEnvelope, EventEnvelope, THREAD_MESSAGE_ADDED};
use threadline_core::outbox::OutboxRecord;
use threadline_core::repository::{
    Direction, DomainRepository, ListThreadMessagesQuery, ListThreadsQuery, OutboxStore,
};
use threadline_core::snapshot::{AggregateSnapshot, ThreadSnapshot};
use threadline_store::pg_domain_repository::PgDomainRepository;

/// Helper to build a thread snapshot with sensible defaults.
fn make_thread(thread_id: &str, user_id: &str, version: i64, updated_at: i64) -> AggregateSnapshot {
    AggregateSnapshot::Thread(ThreadSnapshot {
        thread_id: thread_id.to_string(),
        user_id: user_id.to_string(),
        title: None,
        last_message: None,
        updated_at,
        version,
    })
}

/// Helper to build a message-added event.
fn make_message_event(thread_id: &str, event_id: &str, occurred_at: i64, body: &str) -> DomainEventEnvelope {
    DomainEventEnvelope {
        event_id: event_id.to_string(),
        occurred_at,
        aggregate_id: thread_id.to_string(),
        aggregate_type: AggregateType::Thread,
        event_type: THREAD_MESSAGE_ADDED.to_string(),
        payload: json!({
            "authorId": "u1",
            "message": { "type": "user.message", "payload": { "body": body } }
        }),
        version: None,
    }
}

fn make_echo(id: &str, created_at: i64) -> OutboxRecord {
    OutboxRecord::echo(
        id,
        created_at,
        EventEnvelope::new("ev1", created_at, "assistant.message", json!({}), "s1", None),
    )
}

// --- load_snapshot ---

#[ignore = "requires PostgreSQL"]
#[sqlx::test(migrations = "../../migrations")]
async fn test_load_snapshot_returns_none_for_nonexistent_aggregate(pool: PgPool) {
    let repo = PgDomainRepository::new(pool);

    let loaded = repo.load_snapshot(&AggregateKey::thread("t1")).await.unwrap();

    assert!(loaded.is_none());
}

#[ignore = "requires PostgreSQL"]
#[sqlx::test(migrations = "../../migrations")]
async fn test_load_snapshot_returns_highest_version(pool: PgPool) {
    let repo = PgDomainRepository::new(pool);
    repo.transact(&[], &[make_thread("t1", "u1", 9, 10)], &[]).await.unwrap();
    repo.transact(&[], &[make_thread("t1", "u1", 10, 20)], &[]).await.unwrap();

    let loaded = repo.load_thread("t1").await.unwrap().unwrap();

    assert_eq!(loaded.version, 10);
    assert_eq!(loaded.updated_at, 20);
}

// --- transact ---

#[ignore = "requires PostgreSQL"]
#[sqlx::test(migrations = "../../migrations")]
async fn test_transact_duplicate_event_is_transaction_conflict_and_rolls_back(pool: PgPool) {
    // Arrange
    let repo = PgDomainRepository::new(pool);
    let event = make_message_event("t1", "e1", 100, "hi");
    repo.transact(&[event.clone()], &[make_thread("t1", "u1", 1, 100)], &[])
        .await
        .unwrap();

    // Act
    let result = repo
        .transact(&[event], &[make_thread("t1", "u1", 2, 200)], &[make_echo("o1", 200)])
        .await;

    // Assert
    assert!(matches!(result, Err(DomainError::TransactionConflict(_))));
    assert_eq!(repo.load_thread("t1").await.unwrap().unwrap().version, 1);
    assert!(repo.pending_outbox_records(10).await.unwrap().is_empty());
}

#[ignore = "requires PostgreSQL"]
#[sqlx::test(migrations = "../../migrations")]
async fn test_transact_existing_snapshot_version_is_concurrency_conflict(pool: PgPool) {
    let repo = PgDomainRepository::new(pool);
    repo.transact(&[], &[make_thread("t1", "u1", 4, 100)], &[]).await.unwrap();

    let result = repo
        .transact(
            &[make_message_event("t1", "e2", 200, "x")],
            &[make_thread("t1", "u1", 4, 200)],
            &[],
        )
        .await;

    assert!(matches!(
        result,
        Err(DomainError::ConcurrencyConflict { version: 4, .. })
    ));
    let page = repo
        .list_thread_messages(&ListThreadMessagesQuery::for_thread("t1"))
        .await
        .unwrap();
    assert!(page.items.is_empty());
}

// --- list_threads ---

#[ignore = "requires PostgreSQL"]
#[sqlx::test(migrations = "../../migrations")]
async fn test_list_threads_pages_latest_snapshots_of_owner(pool: PgPool) {
    let repo = PgDomainRepository::new(pool);
    repo.transact(
        &[],
        &[
            make_thread("a", "u1", 1, 10),
            make_thread("b", "u1", 1, 30),
            make_thread("c", "u1", 1, 20),
            make_thread("d", "u2", 1, 40),
        ],
        &[],
    )
    .await
    .unwrap();
    repo.transact(&[], &[make_thread("a", "u1", 2, 50)], &[]).await.unwrap();
    let first = ListThreadsQuery {
        limit: Some(2),
        ..ListThreadsQuery::for_user("u1")
    };

    let page1 = repo.list_threads(&first).await.unwrap();
    let page2 = repo
        .list_threads(&ListThreadsQuery {
            cursor: page1.cursor.clone(),
            ..first
        })
        .await
        .unwrap();

    let ids1: Vec<_> = page1.items.iter().map(|t| t.thread_id.as_str()).collect();
    assert_eq!(ids1, ["a", "b"]);
    assert_eq!(page1.items[0].version, 2);
    let ids2: Vec<_> = page2.items.iter().map(|t| t.thread_id.as_str()).collect();
    assert_eq!(ids2, ["c"]);
    assert!(page2.cursor.is_none());
}

// --- list_thread_messages ---

#[ignore = "requires PostgreSQL"]
#[sqlx::test(migrations = "../../migrations")]
async fn test_list_thread_messages_backward_pages_newest_first(pool: PgPool) {
    let repo = PgDomainRepository::new(pool);
    repo.transact(
        &[
            make_message_event("t1", "e1", 100, "one"),
            make_message_event("t1", "e2", 200, "two"),
            make_message_event("t1", "e3", 300, "three"),
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

    let page1 = repo.list_thread_messages(&first).await.unwrap();
    let page2 = repo
        .list_thread_messages(&ListThreadMessagesQuery {
            cursor: page1.cursor.clone(),
            ..first
        })
        .await
        .unwrap();

    assert_eq!(page1.items[0].payload["body"], "three");
    assert_eq!(page1.items[1].payload["body"], "two");
    assert_eq!(page2.items.len(), 1);
    assert_eq!(page2.items[0].payload["body"], "one");
    assert!(page2.cursor.is_none());
}

// --- outbox ---

#[ignore = "requires PostgreSQL"]
#[sqlx::test(migrations = "../../migrations")]
async fn test_outbox_records_are_pending_until_deleted(pool: PgPool) {
    let repo = PgDomainRepository::new(pool);
    repo.transact(&[], &[], &[make_echo("late", 20), make_echo("early", 10)])
        .await
        .unwrap();

    let pending = repo.pending_outbox_records(10).await.unwrap();
    repo.delete_outbox_record("early").await.unwrap();
    repo.delete_outbox_record("early").await.unwrap();

    let ids: Vec<_> = pending.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["early", "late"]);
    let remaining = repo.pending_outbox_records(10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "late");
}

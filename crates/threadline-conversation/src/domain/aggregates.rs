//! Snapshot transitions for the thread, user and server aggregates.
//!
//! Every transition advances `version` by one and sets `updatedAt` to the
//! event's `occurredAt`.

use serde_json::Value;
use threadline_core::aggregate::AggregateType;
use threadline_core::error::DomainError;
use threadline_core::snapshot::{
    LastMessage, ServerSnapshot, ThreadSnapshot, UserProfile, UserSnapshot,
};

use super::events::{MessageAdded, ServerEventKind, ThreadEventKind, UserEventKind};

/// Picks the `occurredAt` for a new event on an aggregate last updated at
/// `previous`. Events on one aggregate get strictly increasing times so the
/// log sort key matches application order.
#[must_use]
pub fn next_occurred_at(now: i64, previous: Option<i64>) -> i64 {
    previous.map_or(now, |previous| now.max(previous + 1))
}

/// Applies a thread event.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if `current` is `None` and the
/// event is not `Created`.
pub fn apply_thread_event(
    current: Option<&ThreadSnapshot>,
    thread_id: &str,
    event: &ThreadEventKind,
    occurred_at: i64,
) -> Result<ThreadSnapshot, DomainError> {
    if let ThreadEventKind::Created(created) = event {
        return Ok(ThreadSnapshot {
            thread_id: created.thread_id.clone(),
            user_id: created.user_id.clone(),
            title: created.title.clone(),
            last_message: None,
            updated_at: occurred_at,
            version: current.map_or(0, |thread| thread.version) + 1,
        });
    }

    let current = current.ok_or_else(|| DomainError::not_found(AggregateType::Thread, thread_id))?;
    let mut next = current.clone();
    match event {
        ThreadEventKind::MessageAdded(added) => next.last_message = Some(last_message(added)),
        ThreadEventKind::TitleUpdated(updated) => next.title = Some(updated.title.clone()),
        ThreadEventKind::Created(_) | ThreadEventKind::MetadataUpdated(_) => {}
    }
    next.updated_at = occurred_at;
    next.version += 1;
    Ok(next)
}

fn last_message(added: &MessageAdded) -> LastMessage {
    let body = &added.message.payload;
    let text = |field: &str| {
        body.get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };
    LastMessage {
        message_id: text("messageId"),
        author_id: added.author_id.clone(),
        timestamp: body.get("timestamp").and_then(Value::as_i64).unwrap_or_default(),
        body: text("body"),
    }
}

/// Applies a user event, starting a fresh snapshot when none exists.
#[must_use]
pub fn apply_user_event(
    current: Option<&UserSnapshot>,
    user_id: &str,
    event: &UserEventKind,
    occurred_at: i64,
) -> UserSnapshot {
    let mut next = current.cloned().unwrap_or_else(|| UserSnapshot {
        user_id: user_id.to_owned(),
        threads: Vec::new(),
        profile: UserProfile::default(),
        updated_at: occurred_at,
        version: 0,
    });
    match event {
        UserEventKind::ThreadAdded(added) => {
            if !next.threads.contains(&added.thread_id) {
                next.threads.push(added.thread_id.clone());
            }
        }
    }
    next.updated_at = occurred_at;
    next.version += 1;
    next
}

/// Applies a server event, starting a fresh snapshot when none exists.
#[must_use]
pub fn apply_server_event(
    current: Option<&ServerSnapshot>,
    server_id: &str,
    event: &ServerEventKind,
    occurred_at: i64,
) -> ServerSnapshot {
    let mut next = current.cloned().unwrap_or_else(|| ServerSnapshot {
        server_id: server_id.to_owned(),
        users: Vec::new(),
        settings: std::collections::BTreeMap::new(),
        updated_at: occurred_at,
        version: 0,
    });
    match event {
        ServerEventKind::UserJoined(joined) => {
            if !next.users.contains(&joined.user_id) {
                next.users.push(joined.user_id.clone());
            }
        }
    }
    next.updated_at = occurred_at;
    next.version += 1;
    next
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use threadline_core::event::MessageEnvelope;

    use super::*;
    use crate::domain::events::{
        ServerUserJoined, ThreadCreated, ThreadMetadataUpdated, ThreadTitleUpdated,
        UserThreadAdded,
    };

    fn thread(version: i64) -> ThreadSnapshot {
        ThreadSnapshot {
            thread_id: "t1".into(),
            user_id: "u1".into(),
            title: None,
            last_message: None,
            updated_at: 100,
            version,
        }
    }

    #[test]
    fn test_message_added_sets_last_message_and_bumps_version() {
        // Arrange
        let event = ThreadEventKind::MessageAdded(MessageAdded {
            author_id: "u1".into(),
            message: MessageEnvelope {
                message_type: "user.message".into(),
                payload: json!({ "messageId": "m1", "threadId": "t1", "timestamp": 7, "body": "hi" }),
            },
        });

        // Act
        let next = apply_thread_event(Some(&thread(3)), "t1", &event, 200).unwrap();

        // Assert
        assert_eq!(next.version, 4);
        assert_eq!(next.updated_at, 200);
        let last = next.last_message.unwrap();
        assert_eq!(last.message_id, "m1");
        assert_eq!(last.author_id, "u1");
        assert_eq!(last.timestamp, 7);
        assert_eq!(last.body, "hi");
    }

    #[test]
    fn test_title_updated_sets_title() {
        let event = ThreadEventKind::TitleUpdated(ThreadTitleUpdated { title: "Plans".into() });

        let next = apply_thread_event(Some(&thread(1)), "t1", &event, 150).unwrap();

        assert_eq!(next.title.as_deref(), Some("Plans"));
        assert_eq!(next.version, 2);
    }

    #[test]
    fn test_metadata_updated_only_moves_version_and_time() {
        let event = ThreadEventKind::MetadataUpdated(ThreadMetadataUpdated {
            metadata: serde_json::Map::new(),
        });

        let next = apply_thread_event(Some(&thread(2)), "t1", &event, 300).unwrap();

        assert_eq!(next.version, 3);
        assert_eq!(next.updated_at, 300);
        assert_eq!(next.title, None);
        assert_eq!(next.last_message, None);
    }

    #[test]
    fn test_created_starts_at_version_one() {
        let event = ThreadEventKind::Created(ThreadCreated {
            thread_id: "t1".into(),
            user_id: "u1".into(),
            title: Some("New".into()),
        });

        let next = apply_thread_event(None, "t1", &event, 50).unwrap();

        assert_eq!(next.version, 1);
        assert_eq!(next.updated_at, 50);
        assert_eq!(next.title.as_deref(), Some("New"));
    }

    #[test]
    fn test_update_on_missing_thread_is_not_found() {
        let event = ThreadEventKind::TitleUpdated(ThreadTitleUpdated { title: "x".into() });

        let result = apply_thread_event(None, "t1", &event, 50);

        assert!(matches!(result, Err(DomainError::AggregateNotFound { .. })));
    }

    #[test]
    fn test_user_thread_added_creates_snapshot_and_deduplicates() {
        let event = UserEventKind::ThreadAdded(UserThreadAdded { thread_id: "t1".into() });

        let first = apply_user_event(None, "u1", &event, 10);
        let second = apply_user_event(Some(&first), "u1", &event, 20);

        assert_eq!(first.version, 1);
        assert_eq!(first.threads, ["t1"]);
        assert_eq!(second.version, 2);
        assert_eq!(second.threads, ["t1"]);
        assert_eq!(second.updated_at, 20);
    }

    #[test]
    fn test_server_user_joined_appends_user() {
        let event = ServerEventKind::UserJoined(ServerUserJoined { user_id: "u1".into() });

        let next = apply_server_event(None, "default", &event, 10);

        assert_eq!(next.server_id, "default");
        assert_eq!(next.users, ["u1"]);
        assert_eq!(next.version, 1);
    }

    #[test]
    fn test_next_occurred_at_is_strictly_after_previous_update() {
        assert_eq!(next_occurred_at(500, None), 500);
        assert_eq!(next_occurred_at(500, Some(100)), 500);
        assert_eq!(next_occurred_at(500, Some(500)), 501);
        assert_eq!(next_occurred_at(500, Some(900)), 901);
    }
}

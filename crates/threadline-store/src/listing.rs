//! Listing helpers shared by both store implementations.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value;
use threadline_core::error::DomainError;
use threadline_core::event::MessageEnvelope;
use threadline_core::repository::SortOrder;
use threadline_core::snapshot::ThreadSnapshot;

/// Field thread pages are sorted by when the query names none.
pub(crate) const DEFAULT_SORT_FIELD: &str = "updatedAt";

/// `true` when every filter entry equals the snapshot's top-level field.
pub(crate) fn matches_filter(
    snapshot: &ThreadSnapshot,
    filter: &BTreeMap<String, String>,
) -> Result<bool, DomainError> {
    if filter.is_empty() {
        return Ok(true);
    }
    let json = serde_json::to_value(snapshot)?;
    Ok(filter.iter().all(|(field, expected)| {
        json.get(field)
            .is_some_and(|actual| field_equals(actual, expected))
    }))
}

fn field_equals(actual: &Value, expected: &str) -> bool {
    match actual {
        Value::String(s) => s == expected,
        Value::Number(_) | Value::Bool(_) => actual.to_string() == expected,
        _ => false,
    }
}

/// Sorts a page of threads by a numeric field. Missing or non-numeric
/// values sort as zero.
pub(crate) fn sort_threads(threads: &mut [ThreadSnapshot], field: &str, order: SortOrder) {
    let mut keyed: Vec<(f64, ThreadSnapshot)> = threads
        .iter()
        .map(|thread| (numeric_field(thread, field), thread.clone()))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| {
        let ordering = a.partial_cmp(b).unwrap_or(Ordering::Equal);
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
    for (slot, (_, thread)) in threads.iter_mut().zip(keyed) {
        *slot = thread;
    }
}

fn numeric_field(thread: &ThreadSnapshot, field: &str) -> f64 {
    serde_json::to_value(thread)
        .ok()
        .and_then(|json| json.get(field).and_then(Value::as_f64))
        .unwrap_or(0.0)
}

/// Extracts the stored chat message from a `thread.message-added` payload.
pub(crate) fn message_from_payload(payload: &Value) -> Result<MessageEnvelope, DomainError> {
    let message = payload.get("message").cloned().ok_or_else(|| {
        DomainError::Infrastructure("message-added event has no message".into())
    })?;
    serde_json::from_value(message)
        .map_err(|e| DomainError::Infrastructure(format!("malformed stored message: {e}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn thread(id: &str, updated_at: i64, title: Option<&str>) -> ThreadSnapshot {
        ThreadSnapshot {
            thread_id: id.into(),
            user_id: "u1".into(),
            title: title.map(Into::into),
            last_message: None,
            updated_at,
            version: 1,
        }
    }

    #[test]
    fn test_sort_threads_descending_by_updated_at() {
        let mut threads = vec![thread("a", 1, None), thread("b", 3, None), thread("c", 2, None)];

        sort_threads(&mut threads, DEFAULT_SORT_FIELD, SortOrder::Desc);

        let ids: Vec<_> = threads.iter().map(|t| t.thread_id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }

    #[test]
    fn test_sort_by_non_numeric_field_keeps_order() {
        let mut threads = vec![thread("a", 1, Some("z")), thread("b", 3, Some("y"))];

        sort_threads(&mut threads, "title", SortOrder::Asc);

        assert_eq!(threads[0].thread_id, "a");
    }

    #[test]
    fn test_filter_matches_string_and_numeric_fields() {
        let snapshot = thread("a", 5, Some("Plans"));
        let mut filter = BTreeMap::new();
        filter.insert("title".to_owned(), "Plans".to_owned());
        filter.insert("updatedAt".to_owned(), "5".to_owned());

        assert!(matches_filter(&snapshot, &filter).unwrap());

        filter.insert("title".to_owned(), "Other".to_owned());
        assert!(!matches_filter(&snapshot, &filter).unwrap());
    }

    #[test]
    fn test_message_from_payload_requires_message() {
        let payload = json!({ "authorId": "u1", "message": { "type": "user.message", "payload": { "body": "hi" } } });

        let message = message_from_payload(&payload).unwrap();

        assert_eq!(message.message_type, "user.message");
        assert!(message_from_payload(&json!({})).is_err());
    }
}

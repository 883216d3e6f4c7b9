//! The output of reducing a command.

use crate::event::DomainEventEnvelope;
use crate::outbox::OutboxRecord;
use crate::schema::SchemaRegistries;
use crate::snapshot::AggregateSnapshot;

/// Domain events, advanced snapshots and side-effect records produced by
/// one or more reducers. Persisted together or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReductionResult {
    /// New domain events, in production order.
    pub domain_events: Vec<DomainEventEnvelope>,
    /// Advanced snapshots, one per touched aggregate.
    pub snapshots: Vec<AggregateSnapshot>,
    /// Handler-produced outbox records.
    pub outbox_records: Vec<OutboxRecord>,
}

impl ReductionResult {
    /// The empty triple.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` when nothing was produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domain_events.is_empty() && self.snapshots.is_empty() && self.outbox_records.is_empty()
    }

    /// Appends everything from `other`, preserving order.
    pub fn merge(&mut self, other: Self) {
        self.domain_events.extend(other.domain_events);
        self.snapshots.extend(other.snapshots);
        self.outbox_records.extend(other.outbox_records);
    }
}

/// Per-command context handed to every reducer.
#[derive(Debug, Clone, Copy)]
pub struct ReduceContext<'a> {
    /// The session that originated the command.
    pub session_id: &'a str,
    /// The authenticated user, if known.
    pub user_id: Option<&'a str>,
    /// Startup-built schema registries.
    pub schemas: &'a SchemaRegistries,
}

impl ReduceContext<'_> {
    /// The id credited as author of user-originated changes: the user id,
    /// or the session id for anonymous sessions.
    #[must_use]
    pub fn author_id(&self) -> &str {
        self.user_id.unwrap_or(self.session_id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::aggregate::AggregateType;

    fn event(id: &str) -> DomainEventEnvelope {
        DomainEventEnvelope {
            event_id: id.into(),
            occurred_at: 1,
            aggregate_id: "t1".into(),
            aggregate_type: AggregateType::Thread,
            event_type: "thread.message-added".into(),
            payload: json!({}),
            version: None,
        }
    }

    #[test]
    fn test_merge_concatenates_in_order() {
        let mut result = ReductionResult {
            domain_events: vec![event("e1")],
            ..ReductionResult::empty()
        };

        result.merge(ReductionResult {
            domain_events: vec![event("e2")],
            ..ReductionResult::empty()
        });

        let ids: Vec<&str> = result.domain_events.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
        assert!(!result.is_empty());
    }

    #[test]
    fn test_author_falls_back_to_session() {
        let schemas = SchemaRegistries::default();
        let anonymous = ReduceContext {
            session_id: "s1",
            user_id: None,
            schemas: &schemas,
        };
        let known = ReduceContext {
            user_id: Some("u1"),
            ..anonymous
        };

        assert_eq!(anonymous.author_id(), "s1");
        assert_eq!(known.author_id(), "u1");
    }
}

//! Outbox records — side effects written in the same transaction as the
//! state change that triggers them.
//!
//! A record is `pending` once its transaction commits, `published` once the
//! bus accepts it and `retired` once deleted. A record that still exists
//! after a crash must still be delivered.

use serde::{Deserialize, Serialize};

use crate::event::{DomainChangeEnvelope, EventEnvelope};

/// Tag of an echo record.
pub const ECHO_TYPE: &str = "echo";
/// Tag of a domain-change record.
pub const DOMAIN_CHANGE_RECORD_TYPE: &str = "domain-change";

/// The side effect carried by an outbox record; the variant selects the
/// destination topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum OutboxEffect {
    /// Deliver an event envelope back to the originating session.
    #[serde(rename = "echo")]
    Echo(EventEnvelope),
    /// Broadcast a domain change.
    #[serde(rename = "domain-change")]
    DomainChange(DomainChangeEnvelope),
}

/// A pending side effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxRecord {
    /// Unique record identifier, also the consumer dedupe key.
    pub id: String,
    /// Creation time, epoch milliseconds.
    pub created_at: i64,
    /// What to deliver and where.
    #[serde(flatten)]
    pub effect: OutboxEffect,
}

impl OutboxRecord {
    /// Creates an echo record.
    #[must_use]
    pub fn echo(id: impl Into<String>, created_at: i64, envelope: EventEnvelope) -> Self {
        Self {
            id: id.into(),
            created_at,
            effect: OutboxEffect::Echo(envelope),
        }
    }

    /// Creates a domain-change record.
    #[must_use]
    pub fn domain_change(
        id: impl Into<String>,
        created_at: i64,
        change: DomainChangeEnvelope,
    ) -> Self {
        Self {
            id: id.into(),
            created_at,
            effect: OutboxEffect::DomainChange(change),
        }
    }

    /// Returns the record type tag.
    #[must_use]
    pub fn record_type(&self) -> &'static str {
        match self.effect {
            OutboxEffect::Echo(_) => ECHO_TYPE,
            OutboxEffect::DomainChange(_) => DOMAIN_CHANGE_RECORD_TYPE,
        }
    }

    /// Returns the bus partition key for this record: the session id for
    /// echoes, the aggregate id for domain changes.
    #[must_use]
    pub fn partition_key(&self) -> &str {
        match &self.effect {
            OutboxEffect::Echo(envelope) => &envelope.session_id,
            OutboxEffect::DomainChange(change) => &change.aggregate_id,
        }
    }
}

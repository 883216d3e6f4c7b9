//! Event envelopes: inbound/outbound bus events, domain events and the
//! domain-change broadcast wrapper.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregate::{AggregateKey, AggregateType};
use crate::error::DomainError;
use crate::schema::Envelope;

/// Type tag carried by every domain-change broadcast.
pub const DOMAIN_CHANGE_TYPE: &str = "domain.change";

/// Domain event type recording a message appended to a thread.
pub const THREAD_MESSAGE_ADDED: &str = "thread.message-added";

/// A chat message as stored in thread history: the original event type
/// (`user.message`, `assistant.message`) and its validated body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// The message event type.
    #[serde(rename = "type")]
    pub message_type: String,
    /// The message body.
    pub payload: Value,
}

/// A normalized event travelling over the bus, inbound from the session
/// bridge or outbound back to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Unique event identifier.
    pub id: String,
    /// Emission time in epoch milliseconds.
    pub ts: i64,
    /// Event type tag, e.g. `user.message`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Type-specific body, validated by the event schema registry.
    #[serde(default)]
    pub body: Value,
    /// The session this event belongs to.
    pub session_id: String,
    /// The authenticated user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Source topic when consumed from the bus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Source partition when consumed from the bus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<u32>,
    /// Source offset when consumed from the bus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl EventEnvelope {
    /// Builds an event with no transport fields.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        ts: i64,
        event_type: impl Into<String>,
        body: Value,
        session_id: impl Into<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            ts,
            event_type: event_type.into(),
            body,
            session_id: session_id.into(),
            user_id,
            topic: None,
            partition: None,
            offset: None,
        }
    }

    /// Parses a raw bus message into an event envelope.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the bytes are not JSON, a
    /// required field is missing, or the type tag is empty.
    pub fn from_slice(raw: &[u8]) -> Result<Self, DomainError> {
        let envelope: Self = serde_json::from_slice(raw)
            .map_err(|e| DomainError::Validation(format!("invalid event envelope: {e}")))?;
        if envelope.event_type.trim().is_empty() {
            return Err(DomainError::Validation(
                "invalid event envelope: empty type".into(),
            ));
        }
        Ok(envelope)
    }

    /// The bus partition key: the thread id when the body names one,
    /// otherwise the session id.
    #[must_use]
    pub fn partition_key(&self) -> &str {
        self.body
            .get("threadId")
            .and_then(Value::as_str)
            .unwrap_or(&self.session_id)
    }
}

impl Envelope for EventEnvelope {
    fn type_tag(&self) -> &str {
        &self.event_type
    }

    fn body(&self) -> &Value {
        &self.body
    }
}

/// An immutable fact about an aggregate; the unit of the append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEventEnvelope {
    /// Unique event identifier. Never reused.
    pub event_id: String,
    /// Occurrence time in epoch milliseconds.
    pub occurred_at: i64,
    /// The aggregate this event belongs to.
    pub aggregate_id: String,
    /// The aggregate kind.
    pub aggregate_type: AggregateType,
    /// Event type tag, e.g. `thread.message-added`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Type-specific payload.
    pub payload: Value,
    /// Version of the snapshot this event produced, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

impl DomainEventEnvelope {
    /// Returns the aggregate key this event applies to.
    #[must_use]
    pub fn key(&self) -> AggregateKey {
        AggregateKey::new(self.aggregate_type, self.aggregate_id.clone())
    }
}

/// Broadcast wrapper published to the domain-changes topic for every
/// persisted domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainChangeEnvelope {
    /// Unique broadcast identifier.
    pub id: String,
    /// Emission time in epoch milliseconds.
    pub ts: i64,
    /// Always `domain.change`.
    #[serde(rename = "type")]
    pub change_type: String,
    /// The aggregate kind of the wrapped event.
    pub aggregate_type: AggregateType,
    /// The aggregate id of the wrapped event.
    pub aggregate_id: String,
    /// The wrapped domain event.
    pub domain_event: DomainEventEnvelope,
}

impl DomainChangeEnvelope {
    /// Wraps a domain event for broadcast.
    #[must_use]
    pub fn wrap(id: impl Into<String>, ts: i64, domain_event: DomainEventEnvelope) -> Self {
        Self {
            id: id.into(),
            ts,
            change_type: DOMAIN_CHANGE_TYPE.to_owned(),
            aggregate_type: domain_event.aggregate_type,
            aggregate_id: domain_event.aggregate_id.clone(),
            domain_event,
        }
    }
}

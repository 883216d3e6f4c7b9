//! Message bus contracts.
//!
//! Topic names are configuration; message shapes are fixed. Every message
//! is produced with a partition key, which is what gives per-aggregate
//! ordering on the consuming side.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DomainError;
use crate::event::EventEnvelope;

/// Names of the topics the pipeline reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Inbound normalized event envelopes.
    pub events: String,
    /// Derived command envelopes.
    pub commands: String,
    /// Outbound envelopes destined back to a session.
    pub outbox: String,
    /// Domain-change broadcasts.
    pub domain_changes: String,
    /// Messages that could not be processed.
    pub dead_letter: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            events: "ai-platform-events".to_owned(),
            commands: "ai-platform-commands".to_owned(),
            outbox: "ai-platform-outbox".to_owned(),
            domain_changes: "ai-platform-domain-changes".to_owned(),
            dead_letter: "ai-platform-dead-letter".to_owned(),
        }
    }
}

/// Producer side of the message bus.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publishes `message` to `topic` under partition key `key`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Transport` if the bus does not accept the
    /// message.
    async fn publish(&self, topic: &str, key: &str, message: &Value) -> Result<(), DomainError>;
}

/// Delivery of outbound envelopes to live client sessions. Owned by the
/// session bridge; the pipeline never touches connections directly.
#[async_trait]
pub trait SessionEmitter: Send + Sync {
    /// Sends `envelope` to the session. Returns `false` when no live
    /// connection exists for it.
    async fn emit_to_session(&self, session_id: &str, envelope: &EventEnvelope) -> bool;
}

/// A message that could not be processed, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Unique dead-letter identifier.
    pub id: String,
    /// Time the failure was recorded, epoch milliseconds.
    pub ts: i64,
    /// Human-readable failure reason.
    pub reason: String,
    /// The original raw payload: parsed JSON when possible, otherwise the
    /// raw text.
    pub payload: Value,
}

impl DeadLetter {
    /// Builds a dead letter from the raw bytes of the failed message.
    #[must_use]
    pub fn from_raw(id: impl Into<String>, ts: i64, reason: impl Into<String>, raw: &[u8]) -> Self {
        let payload = serde_json::from_slice(raw)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(raw).into_owned()));
        Self {
            id: id.into(),
            ts,
            reason: reason.into(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_dead_letter_keeps_json_payload_structured() {
        let raw = json!({ "id": "c1" }).to_string();

        let letter = DeadLetter::from_raw("d1", 1, "missing type", raw.as_bytes());

        assert_eq!(letter.payload, json!({ "id": "c1" }));
        assert_eq!(letter.reason, "missing type");
    }

    #[test]
    fn test_dead_letter_keeps_non_json_payload_as_text() {
        let letter = DeadLetter::from_raw("d1", 1, "bad json", b"{not json");

        assert_eq!(letter.payload, json!("{not json"));
    }
}

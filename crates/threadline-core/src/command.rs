//! Command envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DomainError;
use crate::schema::Envelope;

/// A command derived from an inbound event. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    /// Unique command identifier.
    pub id: String,
    /// Emission time in epoch milliseconds.
    pub ts: i64,
    /// The session that originated the command.
    pub session_id: String,
    /// The authenticated user, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Command type tag, e.g. `command.save-user-message`.
    #[serde(rename = "type")]
    pub command_type: String,
    /// Type-specific payload, validated by the command schema registry.
    #[serde(default)]
    pub payload: Value,
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

impl CommandEnvelope {
    /// Builds a command with no transport fields.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        ts: i64,
        session_id: impl Into<String>,
        user_id: Option<String>,
        command_type: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: id.into(),
            ts,
            session_id: session_id.into(),
            user_id,
            command_type: command_type.into(),
            payload,
            topic: None,
            partition: None,
            offset: None,
        }
    }

    /// Parses a raw bus message into a command envelope.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the bytes are not JSON, a
    /// required field is missing, or the type tag is empty.
    pub fn from_slice(raw: &[u8]) -> Result<Self, DomainError> {
        let envelope: Self = serde_json::from_slice(raw)
            .map_err(|e| DomainError::Validation(format!("invalid command envelope: {e}")))?;
        if envelope.command_type.trim().is_empty() {
            return Err(DomainError::Validation(
                "invalid command envelope: empty type".into(),
            ));
        }
        Ok(envelope)
    }

    /// The bus partition key: the thread id when the payload names one,
    /// otherwise the session id.
    #[must_use]
    pub fn partition_key(&self) -> &str {
        self.payload
            .get("threadId")
            .and_then(Value::as_str)
            .unwrap_or(&self.session_id)
    }
}

impl Envelope for CommandEnvelope {
    fn type_tag(&self) -> &str {
        &self.command_type
    }

    fn body(&self) -> &Value {
        &self.payload
    }
}

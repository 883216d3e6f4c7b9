//! Chat message bodies carried by `user.message` and `assistant.message`
//! events.

use serde::{Deserialize, Serialize};
use threadline_core::schema::{EventSchemaRegistry, TypedPayload};

use crate::domain::commands::{require_non_empty, require_non_negative};

/// Type tag of [`UserMessageBody`] events.
pub const USER_MESSAGE: &str = "user.message";
/// Type tag of [`AssistantMessageBody`] events.
pub const ASSISTANT_MESSAGE: &str = "assistant.message";

/// A message written by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct UserMessageBody {
    /// The message identifier.
    pub message_id: String,
    /// The thread the message belongs to.
    pub thread_id: String,
    /// Client timestamp, epoch milliseconds.
    pub timestamp: i64,
    /// Message text.
    pub body: String,
}

impl UserMessageBody {
    /// Field-level checks beyond the shape.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation.
    pub fn check(&self) -> Result<(), String> {
        require_non_empty("messageId", &self.message_id)?;
        require_non_empty("threadId", &self.thread_id)?;
        require_non_negative("timestamp", self.timestamp)
    }
}

/// A message written by the assistant in reply to a user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AssistantMessageBody {
    /// The message identifier.
    pub message_id: String,
    /// The user message being answered.
    pub response_to: String,
    /// The thread the message belongs to.
    pub thread_id: String,
    /// The answering assistant.
    pub assistant_id: String,
    /// Generation time, epoch milliseconds.
    pub timestamp: i64,
    /// Message text.
    pub body: String,
}

impl AssistantMessageBody {
    /// Field-level checks beyond the shape.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation.
    pub fn check(&self) -> Result<(), String> {
        require_non_empty("messageId", &self.message_id)?;
        require_non_empty("responseTo", &self.response_to)?;
        require_non_empty("threadId", &self.thread_id)?;
        require_non_empty("assistantId", &self.assistant_id)?;
        require_non_negative("timestamp", self.timestamp)
    }
}

/// Registers the `user.message` and `assistant.message` event schemas.
pub fn register_message_schemas(events: &mut EventSchemaRegistry) {
    events.register(
        USER_MESSAGE,
        TypedPayload::<UserMessageBody>::with_check(UserMessageBody::check),
    );
    events.register(
        ASSISTANT_MESSAGE,
        TypedPayload::<AssistantMessageBody>::with_check(AssistantMessageBody::check),
    );
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use threadline_core::schema::SchemaRegistries;

    use super::*;

    fn registries() -> SchemaRegistries {
        let mut schemas = SchemaRegistries::default();
        register_message_schemas(&mut schemas.events);
        schemas
    }

    #[test]
    fn test_user_message_schema_accepts_valid_body() {
        let schemas = registries();

        let body: UserMessageBody = schemas
            .events
            .parse_payload(
                USER_MESSAGE,
                &json!({ "messageId": "m1", "threadId": "t1", "timestamp": 0, "body": "hi" }),
            )
            .unwrap();

        assert_eq!(body.body, "hi");
    }

    #[test]
    fn test_user_message_schema_rejects_missing_body() {
        let schemas = registries();

        let result = schemas.events.parse_payload::<UserMessageBody>(
            USER_MESSAGE,
            &json!({ "messageId": "m1", "threadId": "t1", "timestamp": 0 }),
        );

        assert!(result.is_err());
    }

    #[test]
    fn test_assistant_message_schema_requires_assistant_id() {
        let schemas = registries();

        let result = schemas.events.parse_payload::<AssistantMessageBody>(
            ASSISTANT_MESSAGE,
            &json!({
                "messageId": "m2", "responseTo": "m1", "threadId": "t1",
                "assistantId": "", "timestamp": 5, "body": "hello"
            }),
        );

        assert!(result.is_err());
    }
}

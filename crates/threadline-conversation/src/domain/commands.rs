//! Commands for the Conversation context, with their payload schemas.

use serde::Deserialize;

/// Type tag of [`SaveUserMessagePayload`].
pub const SAVE_USER_MESSAGE: &str = "command.save-user-message";
/// Type tag of [`GenerateAssistantResponsePayload`].
pub const GENERATE_ASSISTANT_RESPONSE: &str = "command.generate-assistant-response";
/// Type tag of [`CreateThreadPayload`].
pub const CREATE_THREAD: &str = "command.create-thread";
/// Type tag of [`RenameThreadPayload`].
pub const RENAME_THREAD: &str = "command.rename-thread";

/// Persist a user's chat message into its thread.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SaveUserMessagePayload {
    /// The message identifier.
    pub message_id: String,
    /// The thread the message belongs to.
    pub thread_id: String,
    /// Client timestamp, epoch milliseconds.
    pub timestamp: i64,
    /// Message text.
    pub body: String,
}

impl SaveUserMessagePayload {
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

/// Generate and record an assistant reply to a prompt.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct GenerateAssistantResponsePayload {
    /// The text to respond to.
    pub prompt: String,
    /// The message being answered.
    pub response_to: String,
    /// The thread to answer in.
    pub thread_id: String,
}

impl GenerateAssistantResponsePayload {
    /// Field-level checks beyond the shape.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation.
    pub fn check(&self) -> Result<(), String> {
        require_non_empty("responseTo", &self.response_to)?;
        require_non_empty("threadId", &self.thread_id)
    }
}

/// Open a new thread owned by the command's user.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateThreadPayload {
    /// The new thread's identifier.
    pub thread_id: String,
    /// Optional initial title.
    #[serde(default)]
    pub title: Option<String>,
}

impl CreateThreadPayload {
    /// Field-level checks beyond the shape.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation.
    pub fn check(&self) -> Result<(), String> {
        require_non_empty("threadId", &self.thread_id)
    }
}

/// Change a thread's title.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RenameThreadPayload {
    /// The thread to rename.
    pub thread_id: String,
    /// The new title.
    pub title: String,
}

impl RenameThreadPayload {
    /// Field-level checks beyond the shape.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation.
    pub fn check(&self) -> Result<(), String> {
        require_non_empty("threadId", &self.thread_id)?;
        require_non_empty("title", &self.title)
    }
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} must not be empty"))
    } else {
        Ok(())
    }
}

pub(crate) fn require_non_negative(field: &str, value: i64) -> Result<(), String> {
    if value < 0 {
        Err(format!("{field} must not be negative"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_save_payload_rejects_unknown_fields() {
        let result: Result<SaveUserMessagePayload, _> = serde_json::from_value(json!({
            "messageId": "m1", "threadId": "t1", "timestamp": 1, "body": "hi", "extra": 1
        }));

        assert!(result.is_err());
    }

    #[test]
    fn test_save_payload_check_rejects_negative_timestamp() {
        let payload = SaveUserMessagePayload {
            message_id: "m1".into(),
            thread_id: "t1".into(),
            timestamp: -1,
            body: "hi".into(),
        };

        assert_eq!(payload.check().unwrap_err(), "timestamp must not be negative");
    }

    #[test]
    fn test_create_thread_title_is_optional() {
        let payload: CreateThreadPayload = serde_json::from_value(json!({ "threadId": "t1" })).unwrap();

        assert!(payload.title.is_none());
        assert!(payload.check().is_ok());
    }

    #[test]
    fn test_rename_requires_title() {
        let payload = RenameThreadPayload {
            thread_id: "t1".into(),
            title: " ".into(),
        };

        assert!(payload.check().is_err());
    }
}

//! Domain events for the Conversation context.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use threadline_core::event::{MessageEnvelope, THREAD_MESSAGE_ADDED};

/// Type tag of [`ThreadCreated`].
pub const THREAD_CREATED: &str = "thread.created";
/// Type tag of [`ThreadTitleUpdated`].
pub const THREAD_TITLE_UPDATED: &str = "thread.title-updated";
/// Type tag of [`ThreadMetadataUpdated`].
pub const THREAD_METADATA_UPDATED: &str = "thread.metadata-updated";
/// Type tag of [`UserThreadAdded`].
pub const USER_THREAD_ADDED: &str = "user.thread-added";
/// Type tag of [`ServerUserJoined`].
pub const SERVER_USER_JOINED: &str = "server.user-joined";

/// Emitted when a thread is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadCreated {
    /// The thread identifier.
    pub thread_id: String,
    /// The owning user.
    pub user_id: String,
    /// Initial title, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Emitted when a user or assistant message is appended to a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAdded {
    /// Who wrote the message.
    pub author_id: String,
    /// The message as it appears in thread history.
    pub message: MessageEnvelope,
}

/// Emitted when a thread's title changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadTitleUpdated {
    /// The new title.
    pub title: String,
}

/// Emitted when thread metadata changes. The snapshot carries no metadata,
/// so only its version and timestamp move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMetadataUpdated {
    /// The changed metadata entries.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Emitted when a thread is added to a user's thread list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserThreadAdded {
    /// The added thread.
    pub thread_id: String,
}

/// Emitted when a user joins a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerUserJoined {
    /// The joining user.
    pub user_id: String,
}

/// Events recorded against a thread aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadEventKind {
    /// A thread was opened.
    Created(ThreadCreated),
    /// A message was appended.
    MessageAdded(MessageAdded),
    /// The title changed.
    TitleUpdated(ThreadTitleUpdated),
    /// Metadata changed.
    MetadataUpdated(ThreadMetadataUpdated),
}

impl ThreadEventKind {
    /// Returns the event type tag.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Created(_) => THREAD_CREATED,
            Self::MessageAdded(_) => THREAD_MESSAGE_ADDED,
            Self::TitleUpdated(_) => THREAD_TITLE_UPDATED,
            Self::MetadataUpdated(_) => THREAD_METADATA_UPDATED,
        }
    }

    /// Serializes the event body.
    ///
    /// # Panics
    ///
    /// Never in practice: the payload types are plain derived structs.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        // Serialization of derived Serialize types to Value is infallible.
        match self {
            Self::Created(e) => serde_json::to_value(e),
            Self::MessageAdded(e) => serde_json::to_value(e),
            Self::TitleUpdated(e) => serde_json::to_value(e),
            Self::MetadataUpdated(e) => serde_json::to_value(e),
        }
        .expect("ThreadEventKind serialization is infallible")
    }
}

/// Events recorded against a user aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum UserEventKind {
    /// A thread was added to the user's list.
    ThreadAdded(UserThreadAdded),
}

impl UserEventKind {
    /// Returns the event type tag.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ThreadAdded(_) => USER_THREAD_ADDED,
        }
    }

    /// Serializes the event body.
    ///
    /// # Panics
    ///
    /// Never in practice: the payload types are plain derived structs.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        match self {
            Self::ThreadAdded(e) => {
                serde_json::to_value(e).expect("UserEventKind serialization is infallible")
            }
        }
    }
}

/// Events recorded against a server aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEventKind {
    /// A user joined.
    UserJoined(ServerUserJoined),
}

impl ServerEventKind {
    /// Returns the event type tag.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::UserJoined(_) => SERVER_USER_JOINED,
        }
    }

    /// Serializes the event body.
    ///
    /// # Panics
    ///
    /// Never in practice: the payload types are plain derived structs.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        match self {
            Self::UserJoined(e) => {
                serde_json::to_value(e).expect("ServerEventKind serialization is infallible")
            }
        }
    }
}

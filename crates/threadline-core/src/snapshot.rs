//! Aggregate snapshots — the materialized state of an aggregate at a
//! version.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateKey, AggregateType};

/// Server-wide state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSnapshot {
    /// The server identifier.
    pub server_id: String,
    /// Ids of users known to this server.
    #[serde(default)]
    pub users: Vec<String>,
    /// Free-form settings.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    /// Time of the last applied event, epoch milliseconds.
    pub updated_at: i64,
    /// Number of domain events applied.
    pub version: i64,
}

/// Optional display profile of a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Avatar location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// State of a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    /// The user identifier.
    pub user_id: String,
    /// Ids of threads owned by this user.
    #[serde(default)]
    pub threads: Vec<String>,
    /// Display profile.
    #[serde(default)]
    pub profile: UserProfile,
    /// Time of the last applied event, epoch milliseconds.
    pub updated_at: i64,
    /// Number of domain events applied.
    pub version: i64,
}

/// Summary of the most recent message in a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    /// The message identifier.
    pub message_id: String,
    /// The user or assistant that wrote the message.
    pub author_id: String,
    /// Message time, epoch milliseconds.
    pub timestamp: i64,
    /// Message text.
    pub body: String,
}

/// State of a conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSnapshot {
    /// The thread identifier.
    pub thread_id: String,
    /// The owning user.
    pub user_id: String,
    /// Optional title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The most recent message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    /// Time of the last applied event, epoch milliseconds.
    pub updated_at: i64,
    /// Number of domain events applied.
    pub version: i64,
}

/// Any of the three snapshot shapes, tagged by aggregate type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "aggregateType", rename_all = "lowercase")]
pub enum AggregateSnapshot {
    /// A server snapshot.
    Server(ServerSnapshot),
    /// A user snapshot.
    User(UserSnapshot),
    /// A thread snapshot.
    Thread(ThreadSnapshot),
}

impl AggregateSnapshot {
    /// Returns the aggregate kind.
    #[must_use]
    pub fn aggregate_type(&self) -> AggregateType {
        match self {
            Self::Server(_) => AggregateType::Server,
            Self::User(_) => AggregateType::User,
            Self::Thread(_) => AggregateType::Thread,
        }
    }

    /// Returns the aggregate identifier.
    #[must_use]
    pub fn aggregate_id(&self) -> &str {
        match self {
            Self::Server(s) => &s.server_id,
            Self::User(s) => &s.user_id,
            Self::Thread(s) => &s.thread_id,
        }
    }

    /// Returns the aggregate key.
    #[must_use]
    pub fn key(&self) -> AggregateKey {
        AggregateKey::new(self.aggregate_type(), self.aggregate_id())
    }

    /// Returns the snapshot version.
    #[must_use]
    pub fn version(&self) -> i64 {
        match self {
            Self::Server(s) => s.version,
            Self::User(s) => s.version,
            Self::Thread(s) => s.version,
        }
    }

    /// Returns the time of the last applied event.
    #[must_use]
    pub fn updated_at(&self) -> i64 {
        match self {
            Self::Server(s) => s.updated_at,
            Self::User(s) => s.updated_at,
            Self::Thread(s) => s.updated_at,
        }
    }

    /// Returns the owning user for thread snapshots.
    #[must_use]
    pub fn owner_id(&self) -> Option<&str> {
        match self {
            Self::Thread(s) => Some(&s.user_id),
            Self::Server(_) | Self::User(_) => None,
        }
    }
}

impl From<ServerSnapshot> for AggregateSnapshot {
    fn from(snapshot: ServerSnapshot) -> Self {
        Self::Server(snapshot)
    }
}

impl From<UserSnapshot> for AggregateSnapshot {
    fn from(snapshot: UserSnapshot) -> Self {
        Self::User(snapshot)
    }
}

impl From<ThreadSnapshot> for AggregateSnapshot {
    fn from(snapshot: ThreadSnapshot) -> Self {
        Self::Thread(snapshot)
    }
}

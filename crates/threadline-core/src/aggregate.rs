//! Aggregate identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The three aggregate kinds whose state is derived from domain events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateType {
    /// Server-wide state.
    Server,
    /// A single user.
    User,
    /// A conversation thread.
    Thread,
}

impl AggregateType {
    /// Returns the lowercase tag used in storage keys and envelopes.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::User => "user",
            Self::Thread => "thread",
        }
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(Self::Server),
            "user" => Ok(Self::User),
            "thread" => Ok(Self::Thread),
            other => Err(DomainError::Validation(format!(
                "unknown aggregate type: {other}"
            ))),
        }
    }
}

/// `(aggregateType, aggregateId)`: the unit of ordering and versioning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregateKey {
    /// The aggregate kind.
    pub aggregate_type: AggregateType,
    /// The aggregate identifier.
    pub aggregate_id: String,
}

impl AggregateKey {
    /// Creates a new aggregate key.
    #[must_use]
    pub fn new(aggregate_type: AggregateType, aggregate_id: impl Into<String>) -> Self {
        Self {
            aggregate_type,
            aggregate_id: aggregate_id.into(),
        }
    }

    /// Key for a server aggregate.
    #[must_use]
    pub fn server(id: impl Into<String>) -> Self {
        Self::new(AggregateType::Server, id)
    }

    /// Key for a user aggregate.
    #[must_use]
    pub fn user(id: impl Into<String>) -> Self {
        Self::new(AggregateType::User, id)
    }

    /// Key for a thread aggregate.
    #[must_use]
    pub fn thread(id: impl Into<String>) -> Self {
        Self::new(AggregateType::Thread, id)
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.aggregate_type, self.aggregate_id)
    }
}

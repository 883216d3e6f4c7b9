//! Domain error types.

use thiserror::Error;

use crate::aggregate::AggregateType;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An envelope or payload failed schema validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// The envelope declared a different type than the one expected.
    #[error("schema mismatch: expected {expected} but got {actual}")]
    SchemaMismatch {
        /// The type the caller asked for.
        expected: String,
        /// The type declared on the envelope.
        actual: String,
    },

    /// No schema is registered for the declared type.
    #[error("no schema registered for type {0}")]
    UnregisteredSchema(String),

    /// A handler expected an existing snapshot.
    #[error("aggregate not found: {aggregate_type}#{aggregate_id}")]
    AggregateNotFound {
        /// The aggregate kind.
        aggregate_type: AggregateType,
        /// The aggregate identifier.
        aggregate_id: String,
    },

    /// The external text-generation call failed.
    #[error("generation error: {0}")]
    Generation(String),

    /// A duplicate event id was rejected by the store's uniqueness guard.
    #[error("transaction conflict: {0}")]
    TransactionConflict(String),

    /// A snapshot version was already written by a concurrent writer.
    #[error("concurrency conflict on aggregate {aggregate_type}#{aggregate_id}: version {version} already exists")]
    ConcurrencyConflict {
        /// The aggregate kind.
        aggregate_type: AggregateType,
        /// The aggregate that had the conflict.
        aggregate_id: String,
        /// The snapshot version that clashed.
        version: i64,
    },

    /// A publish or consume call on the message bus failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Returns `true` when the error means the write was already durably
    /// applied by an earlier delivery of the same command.
    #[must_use]
    pub fn is_already_applied(&self) -> bool {
        matches!(self, Self::TransactionConflict(_))
    }

    /// Returns `true` when another writer advanced an aggregate between
    /// load and write, so reducing again against fresh snapshots may
    /// succeed.
    #[must_use]
    pub fn is_stale_snapshot(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Shorthand for an `AggregateNotFound` error.
    #[must_use]
    pub fn not_found(aggregate_type: AggregateType, aggregate_id: impl Into<String>) -> Self {
        Self::AggregateNotFound {
            aggregate_type,
            aggregate_id: aggregate_id.into(),
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transaction_conflict_counts_as_already_applied() {
        assert!(DomainError::TransactionConflict("dup".into()).is_already_applied());
        assert!(
            !DomainError::ConcurrencyConflict {
                aggregate_type: AggregateType::Thread,
                aggregate_id: "t1".into(),
                version: 2,
            }
            .is_already_applied()
        );
        assert!(!DomainError::Validation("bad".into()).is_already_applied());
    }

    #[test]
    fn test_only_concurrency_conflict_is_a_stale_snapshot() {
        assert!(
            DomainError::ConcurrencyConflict {
                aggregate_type: AggregateType::Server,
                aggregate_id: "default".into(),
                version: 1,
            }
            .is_stale_snapshot()
        );
        assert!(!DomainError::TransactionConflict("dup".into()).is_stale_snapshot());
    }

    #[test]
    fn test_not_found_message_names_aggregate_key() {
        let err = DomainError::not_found(AggregateType::Thread, "t1");

        assert_eq!(err.to_string(), "aggregate not found: thread#t1");
    }
}

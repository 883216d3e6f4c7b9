//! Partition and sort keys.
//!
//! Numeric components are zero-padded so that lexical order of sort keys
//! equals numeric order.

use threadline_core::aggregate::AggregateKey;

/// Sort-key prefix of event rows.
pub const EVENT_PREFIX: &str = "EVENT#";
/// Sort-key prefix of snapshot rows.
pub const SNAPSHOT_PREFIX: &str = "SNAPSHOT#";
/// Key prefix of outbox rows.
pub const OUTBOX_PREFIX: &str = "OUTBOX#";

/// `AGG#{aggregateType}#{aggregateId}`
#[must_use]
pub fn aggregate_pk(key: &AggregateKey) -> String {
    format!("AGG#{}#{}", key.aggregate_type, key.aggregate_id)
}

/// `EVENT#{occurredAt}#{eventId}`
#[must_use]
pub fn event_sk(occurred_at: i64, event_id: &str) -> String {
    format!("{EVENT_PREFIX}{occurred_at:013}#{event_id}")
}

/// `SNAPSHOT#{version}`
#[must_use]
pub fn snapshot_sk(version: i64) -> String {
    format!("{SNAPSHOT_PREFIX}{version:010}")
}

/// `OUTBOX#{id}`
#[must_use]
pub fn outbox_pk(id: &str) -> String {
    format!("{OUTBOX_PREFIX}{id}")
}

/// `OUTBOX#{createdAt}`
#[must_use]
pub fn outbox_sk(created_at: i64) -> String {
    format!("{OUTBOX_PREFIX}{created_at:013}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        let key = AggregateKey::thread("t1");

        assert_eq!(aggregate_pk(&key), "AGG#thread#t1");
        assert_eq!(event_sk(1000, "e1"), "EVENT#0000000001000#e1");
        assert_eq!(snapshot_sk(4), "SNAPSHOT#0000000004");
        assert_eq!(outbox_pk("o1"), "OUTBOX#o1");
        assert_eq!(outbox_sk(7), "OUTBOX#0000000000007");
    }

    #[test]
    fn test_padded_sort_keys_order_numerically() {
        assert!(snapshot_sk(9) < snapshot_sk(10));
        assert!(event_sk(999, "z") < event_sk(1000, "a"));
    }
}

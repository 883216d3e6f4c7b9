//! Domain store database schema.

/// SQL creating the event log, snapshot and outbox tables. The same file
/// is applied by `sqlx::migrate!` and by the test harness.
pub const CREATE_DOMAIN_STORE: &str =
    include_str!("../../../migrations/20260101000000_domain_store.sql");

/// Table holding the append-only event log.
pub const EVENTS_TABLE: &str = "domain_events";
/// Table holding every snapshot version.
pub const SNAPSHOTS_TABLE: &str = "aggregate_snapshots";
/// Table holding undelivered outbox records.
pub const OUTBOX_TABLE: &str = "outbox_records";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creates_all_tables() {
        for table in [EVENTS_TABLE, SNAPSHOTS_TABLE, OUTBOX_TABLE] {
            assert!(
                CREATE_DOMAIN_STORE.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                "missing {table}"
            );
        }
    }
}

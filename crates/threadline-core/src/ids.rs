//! Identifier generation.
//!
//! In production, envelope and record ids are random UUIDs. In tests a
//! sequential implementation is injected. Command ids and domain event ids
//! are derived rather than generated, so that a redelivered event or
//! command reproduces them.

use uuid::Uuid;

use crate::aggregate::AggregateKey;

/// Namespace for deriving domain event ids.
const EVENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_2c3a_8b4e_4f70_9a61_0c5e_d2b7_4a19);

/// Namespace for deriving command ids from inbound events.
const COMMAND_ID_NAMESPACE: Uuid = Uuid::from_u128(0x2b8e_91d4_5c07_4a3f_b612_7d90_e4a3_1c58);

/// Abstraction over identifier generation.
pub trait IdGenerator: Send + Sync {
    /// Returns a fresh identifier.
    fn next_id(&self) -> String;
}

/// Production generator backed by random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Derives the id of the domain event that `command_id` produces for
/// `aggregate` with the given event type. The same inputs always yield the
/// same id.
#[must_use]
pub fn derive_event_id(command_id: &str, aggregate: &AggregateKey, event_type: &str) -> String {
    let name = format!("{command_id}/{aggregate}/{event_type}");
    Uuid::new_v5(&EVENT_ID_NAMESPACE, name.as_bytes()).to_string()
}

/// Derives the id of the `command_type` command translated from the
/// inbound event `event_id`.
#[must_use]
pub fn derive_command_id(event_id: &str, command_type: &str) -> String {
    let name = format!("{event_id}/{command_type}");
    Uuid::new_v5(&COMMAND_ID_NAMESPACE, name.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_command_id_is_stable_per_event_and_type() {
        let save = derive_command_id("ev-1", "command.save-user-message");

        assert_eq!(save, derive_command_id("ev-1", "command.save-user-message"));
        assert_ne!(save, derive_command_id("ev-2", "command.save-user-message"));
        assert_ne!(save, derive_command_id("ev-1", "command.generate-assistant-response"));
    }

    #[test]
    fn test_derive_event_id_is_stable_for_same_inputs() {
        let key = AggregateKey::thread("t1");

        let first = derive_event_id("cmd-1", &key, "thread.message-added");
        let second = derive_event_id("cmd-1", &key, "thread.message-added");

        assert_eq!(first, second);
    }

    #[test]
    fn test_derive_event_id_differs_per_aggregate_and_type() {
        let thread = AggregateKey::thread("t1");
        let user = AggregateKey::user("t1");

        let a = derive_event_id("cmd-1", &thread, "thread.message-added");
        let b = derive_event_id("cmd-1", &user, "thread.message-added");
        let c = derive_event_id("cmd-1", &thread, "thread.title-updated");
        let d = derive_event_id("cmd-2", &thread, "thread.message-added");

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_random_ids_are_unique() {
        let ids = RandomIds;

        assert_ne!(ids.next_id(), ids.next_id());
    }
}

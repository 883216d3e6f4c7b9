//! Schema registries.
//!
//! Two independent registries, one for commands and one for events, map a
//! type tag to a payload validator. They are populated at startup, before
//! any traffic is processed, and are read-only afterwards.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::command::CommandEnvelope;
use crate::error::DomainError;
use crate::event::EventEnvelope;

/// An envelope that declares a type tag and carries a typed body.
pub trait Envelope {
    /// The declared type tag.
    fn type_tag(&self) -> &str;

    /// The body to validate against the registered schema.
    fn body(&self) -> &Value;
}

/// Validates a raw payload for one type tag.
pub trait PayloadValidator: Send + Sync {
    /// Checks the payload.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` describing the first violation.
    fn validate(&self, payload: &Value) -> Result<(), DomainError>;
}

/// A validator that accepts a payload when it deserializes into `T` and
/// passes an optional field-level check. Strictness (unknown fields,
/// required fields) comes from `T`'s serde attributes.
pub struct TypedPayload<T> {
    check: Option<fn(&T) -> Result<(), String>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedPayload<T> {
    /// A validator that only requires deserialization to succeed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            check: None,
            _marker: PhantomData,
        }
    }

    /// A validator that additionally runs `check` on the decoded value.
    #[must_use]
    pub fn with_check(check: fn(&T) -> Result<(), String>) -> Self {
        Self {
            check: Some(check),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedPayload<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> PayloadValidator for TypedPayload<T> {
    fn validate(&self, payload: &Value) -> Result<(), DomainError> {
        let decoded = T::deserialize(payload).map_err(|e| DomainError::Validation(e.to_string()))?;
        if let Some(check) = self.check {
            check(&decoded).map_err(DomainError::Validation)?;
        }
        Ok(())
    }
}

/// Map from type tag to payload validator for one envelope kind.
pub struct SchemaRegistry<E> {
    kind: &'static str,
    schemas: HashMap<String, Arc<dyn PayloadValidator>>,
    _envelope: PhantomData<fn(&E)>,
}

impl<E: Envelope> SchemaRegistry<E> {
    /// Creates an empty registry. `kind` names the envelope kind in errors.
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            schemas: HashMap::new(),
            _envelope: PhantomData,
        }
    }

    /// Registers (or replaces) the validator for `type_tag`.
    pub fn register(&mut self, type_tag: impl Into<String>, validator: impl PayloadValidator + 'static) {
        self.schemas.insert(type_tag.into(), Arc::new(validator));
    }

    /// Returns `true` if a validator is registered for `type_tag`.
    #[must_use]
    pub fn is_registered(&self, type_tag: &str) -> bool {
        self.schemas.contains_key(type_tag)
    }

    /// Returns the registered type tags, sorted.
    #[must_use]
    pub fn registered_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Validates an envelope. When `expected_type` is given, the declared
    /// type must equal it before the payload is looked at.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::SchemaMismatch` if the declared type differs
    /// from `expected_type`, `DomainError::UnregisteredSchema` if no schema
    /// exists for the type, and `DomainError::Validation` if the payload
    /// fails the schema.
    pub fn validate(&self, envelope: &E, expected_type: Option<&str>) -> Result<(), DomainError> {
        let declared = envelope.type_tag();
        if let Some(expected) = expected_type {
            if declared != expected {
                return Err(DomainError::SchemaMismatch {
                    expected: expected.to_owned(),
                    actual: declared.to_owned(),
                });
            }
        }
        self.validate_payload(declared, envelope.body())
    }

    /// Validates an envelope and decodes its body into `T`.
    ///
    /// # Errors
    ///
    /// Same as [`validate`](Self::validate), plus `DomainError::Validation`
    /// if the body does not decode into `T`.
    pub fn parse<T: DeserializeOwned>(
        &self,
        envelope: &E,
        expected_type: Option<&str>,
    ) -> Result<T, DomainError> {
        self.validate(envelope, expected_type)?;
        decode(envelope.body())
    }

    /// Validates a bare payload against the schema for `type_tag` and
    /// decodes it into `T`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnregisteredSchema` or
    /// `DomainError::Validation`.
    pub fn parse_payload<T: DeserializeOwned>(
        &self,
        type_tag: &str,
        payload: &Value,
    ) -> Result<T, DomainError> {
        self.validate_payload(type_tag, payload)?;
        decode(payload)
    }

    fn validate_payload(&self, type_tag: &str, payload: &Value) -> Result<(), DomainError> {
        let schema = self
            .schemas
            .get(type_tag)
            .ok_or_else(|| DomainError::UnregisteredSchema(format!("{} {type_tag}", self.kind)))?;
        schema.validate(payload)
    }
}

impl<E> fmt::Debug for SchemaRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.schemas.keys().collect();
        types.sort_unstable();
        f.debug_struct("SchemaRegistry")
            .field("kind", &self.kind)
            .field("types", &types)
            .finish()
    }
}

fn decode<T: DeserializeOwned>(payload: &Value) -> Result<T, DomainError> {
    T::deserialize(payload).map_err(|e| DomainError::Validation(e.to_string()))
}

/// Registry of command payload schemas.
pub type CommandSchemaRegistry = SchemaRegistry<CommandEnvelope>;

/// Registry of event body schemas.
pub type EventSchemaRegistry = SchemaRegistry<EventEnvelope>;

/// The command and event registries, built together at startup.
#[derive(Debug)]
pub struct SchemaRegistries {
    /// Command payload schemas.
    pub commands: CommandSchemaRegistry,
    /// Event body schemas.
    pub events: EventSchemaRegistry,
}

impl Default for SchemaRegistries {
    fn default() -> Self {
        Self {
            commands: SchemaRegistry::new("command"),
            events: SchemaRegistry::new("event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields, rename_all = "camelCase")]
    struct Greeting {
        thread_id: String,
        text: String,
    }

    fn non_empty_text(greeting: &Greeting) -> Result<(), String> {
        if greeting.text.is_empty() {
            return Err("text must not be empty".into());
        }
        Ok(())
    }

    fn registry() -> CommandSchemaRegistry {
        let mut registry = CommandSchemaRegistry::new("command");
        registry.register(
            "command.greet",
            TypedPayload::<Greeting>::with_check(non_empty_text),
        );
        registry
    }

    fn command(command_type: &str, payload: Value) -> CommandEnvelope {
        CommandEnvelope::new("c1", 1, "s1", None, command_type, payload)
    }

    #[test]
    fn test_parse_returns_typed_payload() {
        // Arrange
        let registry = registry();
        let envelope = command("command.greet", json!({ "threadId": "t1", "text": "hi" }));

        // Act
        let greeting: Greeting = registry.parse(&envelope, Some("command.greet")).unwrap();

        // Assert
        assert_eq!(greeting.thread_id, "t1");
        assert_eq!(greeting.text, "hi");
    }

    #[test]
    fn test_parse_fails_with_schema_mismatch_before_validating_payload() {
        let registry = registry();
        let envelope = command("command.other", json!({}));

        let result = registry.parse::<Greeting>(&envelope, Some("command.greet"));

        match result {
            Err(DomainError::SchemaMismatch { expected, actual }) => {
                assert_eq!(expected, "command.greet");
                assert_eq!(actual, "command.other");
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_unregistered_type_is_a_hard_failure() {
        let registry = registry();
        let envelope = command("command.unknown", json!({}));

        let result = registry.validate(&envelope, None);

        assert!(matches!(result, Err(DomainError::UnregisteredSchema(_))));
    }

    #[test]
    fn test_unknown_fields_fail_validation() {
        let registry = registry();
        let envelope = command(
            "command.greet",
            json!({ "threadId": "t1", "text": "hi", "extra": true }),
        );

        let result = registry.validate(&envelope, None);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_field_check_runs_after_decoding() {
        let registry = registry();
        let envelope = command("command.greet", json!({ "threadId": "t1", "text": "" }));

        let result = registry.validate(&envelope, None);

        match result {
            Err(DomainError::Validation(reason)) => assert_eq!(reason, "text must not be empty"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_payload_uses_schema_of_named_type() {
        let registry = registry();

        let greeting: Greeting = registry
            .parse_payload("command.greet", &json!({ "threadId": "t2", "text": "yo" }))
            .unwrap();

        assert_eq!(greeting.thread_id, "t2");
        assert_eq!(registry.registered_types(), vec!["command.greet"]);
    }
}

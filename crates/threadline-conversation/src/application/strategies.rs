//! Event strategies for the Conversation context.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use threadline_core::clock::Clock;
use threadline_core::command::CommandEnvelope;
use threadline_core::error::DomainError;
use threadline_core::event::EventEnvelope;
use threadline_core::ids::derive_command_id;
use threadline_core::schema::SchemaRegistries;
use threadline_pipeline::registry::{CommandHandler, EventStrategy, RegistryBuilder};

use crate::domain::commands::{GENERATE_ASSISTANT_RESPONSE, SAVE_USER_MESSAGE};
use crate::domain::messages::{USER_MESSAGE, UserMessageBody, register_message_schemas};

/// Turns a `user.message` event into a save command followed by a request
/// for an assistant reply. Both carry the thread id, so they land on the
/// same partition in that order.
///
/// Command ids are derived from the event id, so a redelivered event yields
/// the same commands and the store rejects their second application.
pub struct UserMessageStrategy {
    clock: Arc<dyn Clock>,
}

impl UserMessageStrategy {
    /// Creates the strategy.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn command(
        &self,
        event: &EventEnvelope,
        command_type: &str,
        payload: serde_json::Value,
    ) -> CommandEnvelope {
        CommandEnvelope::new(
            derive_command_id(&event.id, command_type),
            self.clock.now_millis(),
            event.session_id.clone(),
            event.user_id.clone(),
            command_type,
            payload,
        )
    }
}

#[async_trait]
impl EventStrategy for UserMessageStrategy {
    fn event_type(&self) -> &'static str {
        USER_MESSAGE
    }

    async fn handle(
        &self,
        event: &EventEnvelope,
        schemas: &SchemaRegistries,
    ) -> Result<Vec<CommandEnvelope>, DomainError> {
        let body: UserMessageBody = schemas.events.parse(event, Some(USER_MESSAGE))?;

        let save = self.command(event, SAVE_USER_MESSAGE, event.body.clone());
        let reply = self.command(
            event,
            GENERATE_ASSISTANT_RESPONSE,
            json!({
                "prompt": body.body,
                "responseTo": body.message_id,
                "threadId": body.thread_id,
            }),
        );
        Ok(vec![save, reply])
    }
}

impl CommandHandler for UserMessageStrategy {
    fn register(self: Arc<Self>, registry: &mut RegistryBuilder) {
        register_message_schemas(&mut registry.schemas_mut().events);
        registry.register_strategy(self);
    }
}

//! Event processor: translate inbound events into commands.
//!
//! Translation happens in full before anything is published, so a
//! malformed event never leaves a partial set of commands on the bus.
//! Publishing then runs in order. If the bus rejects a command, that
//! command and every later one are dead-lettered individually, as
//! command messages, so a replay resumes exactly where publishing stopped.

use std::sync::Arc;

use async_trait::async_trait;
use threadline_core::bus::MessagePublisher;
use threadline_core::command::CommandEnvelope;
use threadline_core::error::DomainError;
use threadline_core::event::EventEnvelope;
use tracing::{Span, debug, instrument, warn};

use crate::dead_letter::DeadLetterSink;
use crate::registry::Registry;
use crate::worker::MessageHandler;

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event produced commands, all of which were published.
    Translated {
        /// Number of commands published.
        commands: usize,
    },
    /// No strategy applies to the event.
    Ignored,
    /// Publishing stopped partway; the unpublished commands were
    /// dead-lettered.
    Interrupted {
        /// Number of commands published before the failure.
        published: usize,
        /// The publish failure.
        reason: String,
    },
    /// The event failed and was sent to the dead-letter topic.
    DeadLettered {
        /// The failure reason recorded with the dead letter.
        reason: String,
    },
}

/// Consumes raw event messages and publishes the derived commands.
pub struct EventProcessor {
    registry: Arc<Registry>,
    publisher: Arc<dyn MessagePublisher>,
    commands_topic: String,
    dead_letters: DeadLetterSink,
}

impl EventProcessor {
    /// Creates a new `EventProcessor`.
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        publisher: Arc<dyn MessagePublisher>,
        commands_topic: impl Into<String>,
        dead_letters: DeadLetterSink,
    ) -> Self {
        Self {
            registry,
            publisher,
            commands_topic: commands_topic.into(),
            dead_letters,
        }
    }

    /// Processes one raw event message.
    #[instrument(skip_all, fields(event_id, event_type))]
    pub async fn process(&self, raw: &[u8]) -> EventOutcome {
        let commands = match self.translate(raw).await {
            Ok(Some(commands)) => commands,
            Ok(None) => return EventOutcome::Ignored,
            Err(error) => {
                let reason = error.to_string();
                self.dead_letters.send(&reason, raw).await;
                return EventOutcome::DeadLettered { reason };
            }
        };
        self.publish(&commands).await
    }

    /// Runs every matching strategy. `None` means no strategy applies.
    async fn translate(&self, raw: &[u8]) -> Result<Option<Vec<CommandEnvelope>>, DomainError> {
        let event = EventEnvelope::from_slice(raw)?;
        let span = Span::current();
        span.record("event_id", event.id.as_str());
        span.record("event_type", event.event_type.as_str());

        let schemas = self.registry.schemas();
        schemas.events.validate(&event, None)?;

        let mut matched = false;
        let mut commands = Vec::new();
        for strategy in self.registry.strategies_for(&event) {
            matched = true;
            commands.extend(strategy.handle(&event, schemas).await?);
        }

        if matched {
            Ok(Some(commands))
        } else {
            debug!("No strategy for event");
            Ok(None)
        }
    }

    async fn publish(&self, commands: &[CommandEnvelope]) -> EventOutcome {
        for (published, command) in commands.iter().enumerate() {
            let sent = match serde_json::to_value(command) {
                Ok(message) => self
                    .publisher
                    .publish(&self.commands_topic, command.partition_key(), &message)
                    .await,
                Err(e) => Err(e.into()),
            };
            match sent {
                Ok(()) => {
                    debug!(command_id = %command.id, command_type = %command.command_type, "Published command");
                }
                Err(error) => {
                    let reason = error.to_string();
                    warn!(
                        command_id = %command.id,
                        unpublished = commands.len() - published,
                        error = %error,
                        "Command publish failed; dead-lettering the rest"
                    );
                    for unpublished in &commands[published..] {
                        let raw = serde_json::to_vec(unpublished).unwrap_or_default();
                        self.dead_letters.send(&reason, &raw).await;
                    }
                    return EventOutcome::Interrupted { published, reason };
                }
            }
        }
        EventOutcome::Translated {
            commands: commands.len(),
        }
    }
}

#[async_trait]
impl MessageHandler for EventProcessor {
    async fn handle(&self, payload: Vec<u8>) {
        self.process(&payload).await;
    }
}

//! Threadline — Conversation bounded context.
//!
//! Responsible for threads, their message history, thread ownership by
//! users, and server membership. Registers its command reducers, event
//! strategies and schemas into the pipeline registry at startup.

use std::sync::Arc;

use threadline_core::clock::Clock;
use threadline_core::generation::AssistantGenerator;
use threadline_core::ids::IdGenerator;
use threadline_core::repository::DomainRepository;
use threadline_pipeline::registry::RegistryBuilder;

pub mod application;
pub mod domain;
pub mod generation;

use application::command_handlers::{
    CreateThread, RenameThread, ReplyWithAssistantMessage, SaveUserMessage,
};
use application::strategies::UserMessageStrategy;

/// Collaborators shared by the conversation handlers.
#[derive(Clone)]
pub struct ConversationDeps {
    /// Snapshot and event-log access.
    pub repository: Arc<dyn DomainRepository>,
    /// Assistant text generation.
    pub generator: Arc<dyn AssistantGenerator>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Id source for envelopes, records and message ids.
    pub ids: Arc<dyn IdGenerator>,
    /// The server aggregate users join.
    pub server_id: String,
    /// Identity credited with assistant messages.
    pub assistant_id: String,
}

/// Installs every conversation handler and strategy.
pub fn register_all(builder: &mut RegistryBuilder, deps: &ConversationDeps) {
    builder
        .install(Arc::new(UserMessageStrategy::new(Arc::clone(&deps.clock))))
        .install(Arc::new(CreateThread::new(
            Arc::clone(&deps.repository),
            Arc::clone(&deps.clock),
            deps.server_id.clone(),
        )))
        .install(Arc::new(RenameThread::new(
            Arc::clone(&deps.repository),
            Arc::clone(&deps.clock),
        )))
        .install(Arc::new(SaveUserMessage::new(
            Arc::clone(&deps.repository),
            Arc::clone(&deps.clock),
        )))
        .install(Arc::new(ReplyWithAssistantMessage::new(
            Arc::clone(&deps.repository),
            Arc::clone(&deps.generator),
            Arc::clone(&deps.clock),
            Arc::clone(&deps.ids),
            deps.assistant_id.clone(),
        )));
}

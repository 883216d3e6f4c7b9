//! Application layer for the Conversation context.

pub mod command_handlers;
pub mod strategies;

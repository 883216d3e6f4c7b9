//! Domain layer for the Conversation context.

pub mod aggregates;
pub mod commands;
pub mod events;
pub mod messages;

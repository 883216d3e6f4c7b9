//! Threadline processing engine.
//!
//! Commands flow through a startup-built [`registry::Registry`] and the
//! [`reducer_chain::ReducerChain`]; their results are persisted and
//! dispatched by the [`outbox::OutboxService`]. Inbound events are
//! translated into commands by the [`event_processor::EventProcessor`].
//! [`worker::PartitionedWorkers`] provide the per-key sequential execution
//! that per-aggregate ordering depends on.

pub mod dead_letter;
pub mod echo;
pub mod event_processor;
pub mod outbox;
pub mod processor;
pub mod reducer_chain;
pub mod registry;
pub mod worker;

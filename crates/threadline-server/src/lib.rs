//! Threadline service.
//!
//! Wires the conversation handlers into the command and event pipelines,
//! exposes HTTP ingress onto the partitioned workers, and fans outbox,
//! domain-change and dead-letter traffic out over Redis.

pub mod bus;
pub mod config;
pub mod error;
pub mod routes;
pub mod runtime;
pub mod state;
pub mod telemetry;

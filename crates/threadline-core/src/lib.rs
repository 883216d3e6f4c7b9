//! Threadline Core — shared domain abstractions.
//!
//! This crate defines the envelopes, snapshots, error taxonomy and traits
//! that the pipeline, the stores and the bounded contexts depend on. It
//! contains no infrastructure code.

pub mod aggregate;
pub mod bus;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod generation;
pub mod ids;
pub mod outbox;
pub mod reduction;
pub mod repository;
pub mod schema;
pub mod snapshot;

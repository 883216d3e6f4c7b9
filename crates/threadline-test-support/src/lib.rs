//! Shared test mocks and utilities for the Threadline pipeline.

mod clock;
mod generator;
mod ids;
mod publisher;
mod repository;
mod session;

pub use clock::FixedClock;
pub use generator::{FailingGenerator, StaticGenerator};
pub use ids::SequentialIds;
pub use publisher::{FailingPublisher, PublishedMessage, RecordingPublisher};
pub use repository::{FailingDomainRepository, FlakyOutboxStore};
pub use session::RecordingSessionEmitter;

//! Threadline domain stores.
//!
//! Two implementations of the `DomainRepository` and `OutboxStore` traits
//! with identical semantics: a PostgreSQL store for production and an
//! in-memory store for tests and local development. Both lay data out
//! under the same partition/sort keys.

pub mod cursor;
pub mod keys;
mod listing;
pub mod memory;
pub mod pg_domain_repository;
pub mod schema;

pub use memory::MemoryDomainRepository;
pub use pg_domain_repository::PgDomainRepository;

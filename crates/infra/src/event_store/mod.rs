//! Append-only event store boundary.
//!
//! Business-scoped streams with optimistic concurrency; no storage
//! assumptions beyond the in-memory implementation.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

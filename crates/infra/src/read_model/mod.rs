//! Business-isolated read model storage.

pub mod business_store;

pub use business_store::{BusinessStore, InMemoryBusinessStore};

//! Collaborator services consumed by the procurement engine.
//!
//! The engine never reaches for shared global state: the catalog, partner
//! directory and notifier are injected at construction. In-memory
//! implementations back tests and single-process deployments.

pub mod catalog;
pub mod directory;
pub mod notifier;

pub use catalog::{Catalog, CatalogItem, InMemoryCatalog};
pub use directory::{InMemoryPartnerDirectory, PartnerDirectory, PartnerFilter, PartnerReadModel};
pub use notifier::{Notification, NotificationKind, Notifier, RecordingNotifier, TracingNotifier};

//! Read model builders.
//!
//! Projections consume committed envelopes and keep query-shaped rows per
//! business. All of them are:
//! - **Rebuildable** from the event streams
//! - **Business-isolated**
//! - **Idempotent** under at-least-once delivery (per-stream cursors)

use thiserror::Error;

pub mod cursor;
pub mod purchase_orders;
pub mod seller_inbox;

pub use cursor::{InMemoryCursorStore, ProjectionCursorStore};
pub use purchase_orders::{PurchaseOrderReadModel, PurchaseOrdersProjection};
pub use seller_inbox::{InboxEntry, SellerInboxProjection};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),
    #[error("business isolation violation: {0}")]
    BusinessIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

//! Seller inbox: the B2B requests other businesses have sent to this one.
//!
//! Fed asynchronously from the bus by a projection worker, so a freshly
//! transmitted request becomes visible to the seller eventually.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use procureflow_core::{Amount, BusinessId};
use procureflow_events::EventEnvelope;
use procureflow_purchasing::{
    B2BRequestEvent, B2BRequestId, BusinessRef, CourierDetails, PurchaseOrderId, SellerStatus,
};

use super::cursor::{self, InMemoryCursorStore, ProjectionCursorStore};
use super::ProjectionError;
use crate::read_model::BusinessStore;

pub const AGGREGATE_TYPE: &str = "purchasing.b2b_request";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboxEntry {
    pub request_id: B2BRequestId,
    pub original_po_id: PurchaseOrderId,
    pub source: BusinessRef,
    pub status: SellerStatus,
    pub total_amount: Amount,
    pub item_count: usize,
    pub courier: Option<CourierDetails>,
    pub note: Option<String>,
    pub received_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SellerInboxProjection<S, C = InMemoryCursorStore>
where
    S: BusinessStore<B2BRequestId, InboxEntry>,
{
    store: S,
    cursors: Arc<C>,
    projection_name: String,
}

impl<S> SellerInboxProjection<S>
where
    S: BusinessStore<B2BRequestId, InboxEntry>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: Arc::new(InMemoryCursorStore::new()),
            projection_name: "purchasing.seller_inbox".to_string(),
        }
    }
}

impl<S, C> SellerInboxProjection<S, C>
where
    S: BusinessStore<B2BRequestId, InboxEntry>,
    C: ProjectionCursorStore,
{
    pub fn get(&self, business_id: BusinessId, request_id: &B2BRequestId) -> Option<InboxEntry> {
        self.store.get(business_id, request_id)
    }

    /// Oldest first, the order a seller works through them.
    pub fn list(&self, business_id: BusinessId) -> Vec<InboxEntry> {
        let mut rows = self.store.list(business_id);
        rows.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.request_id.cmp(&b.request_id))
        });
        rows
    }

    pub fn pending(&self, business_id: BusinessId) -> Vec<InboxEntry> {
        self.list(business_id)
            .into_iter()
            .filter(|e| e.status == SellerStatus::Pending)
            .collect()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let business_id = envelope.business_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self
            .cursors
            .get_cursor(business_id, aggregate_id, &self.projection_name)
            .unwrap_or(0);
        if !cursor::is_next(last, seq)? {
            return Ok(());
        }

        let ev: B2BRequestEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let event_business = match &ev {
            B2BRequestEvent::RequestReceived(e) => e.business_id,
            B2BRequestEvent::RequestProcessed(e) => e.business_id,
            B2BRequestEvent::RequestShipped(e) => e.business_id,
            B2BRequestEvent::RequestCompleted(e) => e.business_id,
            B2BRequestEvent::RequestRejected(e) => e.business_id,
        };
        if event_business != business_id {
            return Err(ProjectionError::BusinessIsolation(
                "event business_id does not match envelope business_id".to_string(),
            ));
        }
        if &ev.request_id().0 != aggregate_id {
            return Err(ProjectionError::BusinessIsolation(
                "event request_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let occurred_at = procureflow_events::Event::occurred_at(&ev);
        match ev {
            B2BRequestEvent::RequestReceived(e) => {
                self.store.upsert(
                    business_id,
                    e.request_id.clone(),
                    InboxEntry {
                        request_id: e.request_id,
                        original_po_id: e.original_po_id,
                        source: e.source,
                        status: SellerStatus::Pending,
                        total_amount: e.total_amount,
                        item_count: e.items.len(),
                        courier: None,
                        note: e.note,
                        received_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            other => {
                let request_id = other.request_id().clone();
                if let Some(mut entry) = self.store.get(business_id, &request_id) {
                    entry.status = other.resulting_status();
                    entry.updated_at = occurred_at;
                    match other {
                        B2BRequestEvent::RequestShipped(e) => entry.courier = e.courier,
                        B2BRequestEvent::RequestRejected(e) if e.reason.is_some() => {
                            entry.note = e.reason
                        }
                        _ => {}
                    }
                    self.store.upsert(business_id, request_id, entry);
                }
            }
        }

        self.cursors
            .update_cursor(business_id, aggregate_id, &self.projection_name, seq);
        Ok(())
    }
}

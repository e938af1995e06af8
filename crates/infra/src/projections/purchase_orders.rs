use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use procureflow_core::{Amount, BusinessId};
use procureflow_events::EventEnvelope;
use procureflow_partners::PartnerId;
use procureflow_purchasing::{
    B2BRequestId, PaymentStatus, PoStatus, PurchaseOrderEvent, PurchaseOrderId,
};

use super::cursor::{self, InMemoryCursorStore, ProjectionCursorStore};
use super::ProjectionError;
use crate::read_model::BusinessStore;

pub const AGGREGATE_TYPE: &str = "purchasing.order";

/// One row of the buyer's order list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseOrderReadModel {
    pub order_id: PurchaseOrderId,
    pub supplier_id: PartnerId,
    pub supplier_name: String,
    pub status: PoStatus,
    pub payment_status: PaymentStatus,
    pub total_estimated: Amount,
    pub total_bill: Option<Amount>,
    pub item_count: usize,
    pub b2b_request_id: Option<B2BRequestId>,
    pub order_date: Option<DateTime<Utc>>,
    pub received_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Buyer-side order list per business.
#[derive(Debug)]
pub struct PurchaseOrdersProjection<S, C = InMemoryCursorStore>
where
    S: BusinessStore<PurchaseOrderId, PurchaseOrderReadModel>,
{
    store: S,
    cursors: Arc<C>,
    projection_name: String,
}

impl<S> PurchaseOrdersProjection<S>
where
    S: BusinessStore<PurchaseOrderId, PurchaseOrderReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: Arc::new(InMemoryCursorStore::new()),
            projection_name: "purchasing.orders".to_string(),
        }
    }

    pub fn with_cursor_store<C: ProjectionCursorStore>(
        self,
        cursors: Arc<C>,
        projection_name: impl Into<String>,
    ) -> PurchaseOrdersProjection<S, C> {
        PurchaseOrdersProjection {
            store: self.store,
            cursors,
            projection_name: projection_name.into(),
        }
    }
}

impl<S, C> PurchaseOrdersProjection<S, C>
where
    S: BusinessStore<PurchaseOrderId, PurchaseOrderReadModel>,
    C: ProjectionCursorStore,
{
    pub fn get(
        &self,
        business_id: BusinessId,
        order_id: &PurchaseOrderId,
    ) -> Option<PurchaseOrderReadModel> {
        self.store.get(business_id, order_id)
    }

    /// Newest orders first.
    pub fn list(&self, business_id: BusinessId) -> Vec<PurchaseOrderReadModel> {
        let mut rows = self.store.list(business_id);
        rows.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        rows
    }

    pub fn list_by_status(&self, business_id: BusinessId, status: PoStatus) -> Vec<PurchaseOrderReadModel> {
        self.list(business_id)
            .into_iter()
            .filter(|r| r.status == status)
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

        let ev: PurchaseOrderEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_business, order_id) = match &ev {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => (e.business_id, &e.order_id),
            PurchaseOrderEvent::PurchaseOrderSubmitted(e) => (e.business_id, &e.order_id),
            PurchaseOrderEvent::PurchaseOrderStatusChanged(e) => (e.business_id, &e.order_id),
            PurchaseOrderEvent::GoodsReceived(e) => (e.business_id, &e.order_id),
        };
        if event_business != business_id {
            return Err(ProjectionError::BusinessIsolation(
                "event business_id does not match envelope business_id".to_string(),
            ));
        }
        if &order_id.0 != aggregate_id {
            return Err(ProjectionError::BusinessIsolation(
                "event order_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.store.upsert(
                    business_id,
                    e.order_id.clone(),
                    PurchaseOrderReadModel {
                        order_id: e.order_id,
                        supplier_id: e.supplier.partner_id,
                        supplier_name: e.supplier.name,
                        status: PoStatus::Draft,
                        payment_status: PaymentStatus::Unpaid,
                        total_estimated: e.total_estimated,
                        total_bill: None,
                        item_count: e.lines.len(),
                        b2b_request_id: None,
                        order_date: None,
                        received_date: None,
                        due_date: None,
                        updated_at: e.occurred_at,
                    },
                );
            }
            PurchaseOrderEvent::PurchaseOrderSubmitted(e) => {
                if let Some(mut rm) = self.store.get(business_id, &e.order_id) {
                    rm.status = e.status;
                    rm.total_estimated = e.total_estimated;
                    rm.item_count = e.lines.len();
                    rm.b2b_request_id = e.b2b.map(|link| link.request_id);
                    rm.order_date = Some(e.occurred_at);
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(business_id, e.order_id, rm);
                }
            }
            PurchaseOrderEvent::PurchaseOrderStatusChanged(e) => {
                if let Some(mut rm) = self.store.get(business_id, &e.order_id) {
                    rm.status = e.to;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(business_id, e.order_id, rm);
                }
            }
            PurchaseOrderEvent::GoodsReceived(e) => {
                if let Some(mut rm) = self.store.get(business_id, &e.order_id) {
                    rm.status = PoStatus::Received;
                    rm.payment_status = e.payment_status;
                    rm.total_bill = Some(e.total_bill);
                    rm.received_date = Some(e.occurred_at);
                    rm.due_date = e.due_date;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(business_id, e.order_id, rm);
                }
            }
        }

        self.cursors
            .update_cursor(business_id, aggregate_id, &self.projection_name, seq);
        Ok(())
    }

    /// Clear and replay the given envelopes, stream by stream.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut businesses = envs.iter().map(|e| e.business_id()).collect::<Vec<_>>();
        businesses.sort();
        businesses.dedup();
        for b in businesses {
            self.store.clear_business(b);
            self.cursors.clear_cursors(b, &self.projection_name);
        }

        envs.sort_by(|a, b| {
            (a.business_id(), a.aggregate_id(), a.sequence_number())
                .cmp(&(b.business_id(), b.aggregate_id(), b.sequence_number()))
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

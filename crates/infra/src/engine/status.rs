//! Status-change notifications published by the engine.
//!
//! One message per accepted transition, on either side of a B2B pair.
//! Consumers subscribe instead of polling order state.

use chrono::{DateTime, Utc};
use serde::Serialize;

use procureflow_core::{AggregateId, BusinessId};
use procureflow_events::BusinessScoped;
use procureflow_purchasing::{B2BRequestEvent, PoStatus, PurchaseOrderEvent, SellerStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "side", rename_all = "snake_case")]
pub enum StatusChange {
    /// `from` is `None` when the order was created and placed in one step.
    Buyer { from: Option<PoStatus>, to: PoStatus },
    Seller { from: Option<SellerStatus>, to: SellerStatus },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderStatusChanged {
    pub business_id: BusinessId,
    /// Buyer order id or seller request id.
    pub document_id: AggregateId,
    /// Reconciliation key shared by both sides.
    pub original_po_id: AggregateId,
    pub change: StatusChange,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

impl BusinessScoped for OrderStatusChanged {
    fn business_id(&self) -> BusinessId {
        self.business_id
    }
}

impl OrderStatusChanged {
    /// One message per status-changing order event. Creation alone is not a
    /// status change.
    pub fn from_order_events(events: &[PurchaseOrderEvent]) -> Vec<Self> {
        let created_here = events
            .iter()
            .any(|e| matches!(e, PurchaseOrderEvent::PurchaseOrderCreated(_)));

        events
            .iter()
            .filter_map(|event| {
                let (business_id, order_id, actor, occurred_at, from) = match event {
                    PurchaseOrderEvent::PurchaseOrderCreated(_) => return None,
                    PurchaseOrderEvent::PurchaseOrderSubmitted(e) => (
                        e.business_id,
                        &e.order_id,
                        &e.actor,
                        e.occurred_at,
                        (!created_here).then_some(PoStatus::Draft),
                    ),
                    PurchaseOrderEvent::PurchaseOrderStatusChanged(e) => {
                        (e.business_id, &e.order_id, &e.actor, e.occurred_at, Some(e.from))
                    }
                    PurchaseOrderEvent::GoodsReceived(e) => (
                        e.business_id,
                        &e.order_id,
                        &e.actor,
                        e.occurred_at,
                        Some(PoStatus::Shipped),
                    ),
                };
                Some(Self {
                    business_id,
                    document_id: order_id.0.clone(),
                    original_po_id: order_id.0.clone(),
                    change: StatusChange::Buyer {
                        from,
                        to: event.resulting_status(),
                    },
                    actor: actor.name.clone(),
                    occurred_at,
                })
            })
            .collect()
    }

    pub fn from_request_events(events: &[B2BRequestEvent]) -> Vec<Self> {
        events
            .iter()
            .map(|event| {
                let (business_id, actor, occurred_at, from) = match event {
                    B2BRequestEvent::RequestReceived(e) => {
                        (e.business_id, e.source.name.clone(), e.occurred_at, None)
                    }
                    B2BRequestEvent::RequestProcessed(e) => (
                        e.business_id,
                        e.actor.name.clone(),
                        e.occurred_at,
                        Some(SellerStatus::Pending),
                    ),
                    B2BRequestEvent::RequestShipped(e) => (
                        e.business_id,
                        e.actor.name.clone(),
                        e.occurred_at,
                        Some(SellerStatus::Processed),
                    ),
                    B2BRequestEvent::RequestCompleted(e) => (
                        e.business_id,
                        e.actor.name.clone(),
                        e.occurred_at,
                        Some(SellerStatus::Shipped),
                    ),
                    B2BRequestEvent::RequestRejected(e) => (
                        e.business_id,
                        e.actor.name.clone(),
                        e.occurred_at,
                        Some(SellerStatus::Pending),
                    ),
                };
                Self {
                    business_id,
                    document_id: event.request_id().0.clone(),
                    original_po_id: event.original_po_id().0.clone(),
                    change: StatusChange::Seller {
                        from,
                        to: event.resulting_status(),
                    },
                    actor,
                    occurred_at,
                }
            })
            .collect()
    }
}

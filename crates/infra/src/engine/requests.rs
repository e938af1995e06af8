//! Purchase requests (PR mode): an internal backlog reviewed before any
//! order exists.

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::info;

use procureflow_core::BusinessId;
use procureflow_events::{EventBus, EventEnvelope};
use procureflow_purchasing::{
    Actor, Cart, ConvertRequest, DismissRequest, OrderDraft, OrderMode, PurchaseOrderId,
    PurchaseRequest, PurchaseRequestCommand, PurchaseRequestId, SubmitRequest,
};

use super::{EngineError, EngineResult, PURCHASE_REQUEST_TYPE, ProcurementEngine};
use crate::event_store::EventStore;

impl<S, B> ProcurementEngine<S, B>
where
    S: EventStore + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    /// Record a cart as a request. Never gated by approval, whatever its value.
    pub fn submit_request(
        &self,
        business_id: BusinessId,
        cart: &Cart,
        actor: &Actor,
        note: Option<String>,
    ) -> EngineResult<PurchaseRequest> {
        if cart.is_empty() {
            return Err(EngineError::validation("cart is empty"));
        }
        let request_id = PurchaseRequestId::generate();
        let cmd = PurchaseRequestCommand::SubmitRequest(SubmitRequest {
            business_id,
            request_id: request_id.clone(),
            lines: cart.lines().to_vec(),
            actor: actor.clone(),
            note,
            occurred_at: Utc::now(),
        });
        let request = self.execute_purchase_request(business_id, &request_id, cmd)?;
        let total = request.total()?;
        info!(%business_id, %request_id, %total, "purchase request recorded");
        Ok(request)
    }

    /// Close the request and hand back one draft per supplier, with order
    /// ids reserved. The drafts go through the usual cart review and submit.
    pub fn convert_request(
        &self,
        business_id: BusinessId,
        request_id: &PurchaseRequestId,
        actor: &Actor,
    ) -> EngineResult<Vec<OrderDraft>> {
        let _ticket = self.in_flight.try_acquire(business_id, &request_id.0)?;
        let request = self.purchase_request(business_id, request_id)?;

        let drafts: Vec<OrderDraft> = request
            .to_cart()
            .split_by_supplier(OrderMode::Po)
            .into_iter()
            .map(|draft| draft.with_order_id(PurchaseOrderId::generate()))
            .collect();
        let order_ids: Vec<PurchaseOrderId> = drafts.iter().filter_map(|d| d.order_id.clone()).collect();

        let cmd = PurchaseRequestCommand::ConvertRequest(ConvertRequest {
            business_id,
            request_id: request_id.clone(),
            order_ids,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.execute_purchase_request(business_id, request_id, cmd)?;
        info!(%business_id, %request_id, drafts = drafts.len(), "purchase request converted");
        Ok(drafts)
    }

    pub fn dismiss_request(
        &self,
        business_id: BusinessId,
        request_id: &PurchaseRequestId,
        actor: &Actor,
        reason: Option<String>,
    ) -> EngineResult<PurchaseRequest> {
        let _ticket = self.in_flight.try_acquire(business_id, &request_id.0)?;
        let cmd = PurchaseRequestCommand::DismissRequest(DismissRequest {
            business_id,
            request_id: request_id.clone(),
            actor: actor.clone(),
            reason,
            occurred_at: Utc::now(),
        });
        let request = self.execute_purchase_request(business_id, request_id, cmd)?;
        info!(%business_id, %request_id, "purchase request dismissed");
        Ok(request)
    }

    pub fn purchase_request(&self, business_id: BusinessId, request_id: &PurchaseRequestId) -> EngineResult<PurchaseRequest> {
        let request = self.dispatcher.load(business_id, request_id.0.clone(), |_, id| {
            PurchaseRequest::empty(PurchaseRequestId(id))
        })?;
        if !request.is_created() {
            return Err(EngineError::not_found(format!("purchase request {request_id}")));
        }
        Ok(request)
    }

    fn execute_purchase_request(
        &self,
        business_id: BusinessId,
        request_id: &PurchaseRequestId,
        cmd: PurchaseRequestCommand,
    ) -> EngineResult<PurchaseRequest> {
        self.run::<PurchaseRequest>(business_id, &request_id.0, PURCHASE_REQUEST_TYPE, cmd, |_, id| {
            PurchaseRequest::empty(PurchaseRequestId(id))
        })
        .map_err(|e| e.or_not_found(format!("purchase request {request_id}")))?;
        self.purchase_request(business_id, request_id)
    }
}

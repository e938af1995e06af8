//! Seller-side handling of mirrored requests.
//!
//! Each action is committed in the seller's business first. Ship and reject
//! are then carried over to the buyer's order as a separate commit; a failure
//! there is logged and left for the buyer side to reconcile. A rejected order
//! also gives its committed spend back to the buyer's budget.

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use procureflow_core::BusinessId;
use procureflow_events::{EventBus, EventEnvelope};
use procureflow_purchasing::{
    Actor, B2BRequest, B2BRequestCommand, B2BRequestId, B2BRequestRecord, CompleteRequest,
    CourierDetails, PoStatus, ProcessRequest, RejectRequest, ShipRequest,
};

use super::orders::transition_cmd;
use super::{EngineError, EngineResult, ProcurementEngine};
use crate::event_store::EventStore;
use crate::services::NotificationKind;

impl<S, B> ProcurementEngine<S, B>
where
    S: EventStore + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    /// Accept a pending request. `checked_by` defaults to the acting user.
    pub fn process_request(
        &self,
        business_id: BusinessId,
        request_id: &B2BRequestId,
        actor: &Actor,
        checked_by: Option<String>,
    ) -> EngineResult<B2BRequest> {
        let _ticket = self.in_flight.try_acquire(business_id, &request_id.0)?;
        let cmd = B2BRequestCommand::ProcessRequest(ProcessRequest {
            business_id,
            request_id: request_id.clone(),
            actor: actor.clone(),
            checked_by,
            occurred_at: Utc::now(),
        });
        let (request, events) = self.execute_request(business_id, request_id, cmd)?;
        if !events.is_empty() {
            info!(%business_id, %request_id, actor = %actor.name, "request processed");
            self.notify_source(&request, NotificationKind::RequestProcessed);
        }
        Ok(request)
    }

    /// Ship a processed request. The buyer's order follows to `shipped`.
    pub fn ship_request(
        &self,
        business_id: BusinessId,
        request_id: &B2BRequestId,
        actor: &Actor,
        courier: Option<CourierDetails>,
    ) -> EngineResult<B2BRequest> {
        let _ticket = self.in_flight.try_acquire(business_id, &request_id.0)?;
        let cmd = B2BRequestCommand::ShipRequest(ShipRequest {
            business_id,
            request_id: request_id.clone(),
            actor: actor.clone(),
            courier,
            occurred_at: Utc::now(),
        });
        let (request, events) = self.execute_request(business_id, request_id, cmd)?;
        if !events.is_empty() {
            info!(%business_id, %request_id, actor = %actor.name, "request shipped");
            self.notify_source(&request, NotificationKind::RequestShipped);
            self.follow_on_buyer_side(&request, PoStatus::Shipped, actor, None);
        }
        Ok(request)
    }

    /// Close a shipped request on the seller's books. The buyer's order is
    /// untouched; receipt is the buyer's own action.
    pub fn complete_request(
        &self,
        business_id: BusinessId,
        request_id: &B2BRequestId,
        actor: &Actor,
    ) -> EngineResult<B2BRequest> {
        let _ticket = self.in_flight.try_acquire(business_id, &request_id.0)?;
        let cmd = B2BRequestCommand::CompleteRequest(CompleteRequest {
            business_id,
            request_id: request_id.clone(),
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        let (request, events) = self.execute_request(business_id, request_id, cmd)?;
        if !events.is_empty() {
            info!(%business_id, %request_id, "request completed");
            self.notify_source(&request, NotificationKind::RequestCompleted);
        }
        Ok(request)
    }

    /// Decline a pending request. The buyer's order moves to `rejected`.
    pub fn reject_request(
        &self,
        business_id: BusinessId,
        request_id: &B2BRequestId,
        actor: &Actor,
        reason: Option<String>,
    ) -> EngineResult<B2BRequest> {
        let _ticket = self.in_flight.try_acquire(business_id, &request_id.0)?;
        let cmd = B2BRequestCommand::RejectRequest(RejectRequest {
            business_id,
            request_id: request_id.clone(),
            actor: actor.clone(),
            reason: reason.clone(),
            occurred_at: Utc::now(),
        });
        let (request, events) = self.execute_request(business_id, request_id, cmd)?;
        if !events.is_empty() {
            info!(%business_id, %request_id, reason = reason.as_deref().unwrap_or(""), "request rejected");
            self.notify_source(&request, NotificationKind::RequestRejected);
            self.follow_on_buyer_side(&request, PoStatus::Rejected, actor, reason);
        }
        Ok(request)
    }

    /// The request as exchanged with other systems.
    pub fn request_record(&self, business_id: BusinessId, request_id: &B2BRequestId) -> EngineResult<B2BRequestRecord> {
        Ok(self.load_request(business_id, request_id)?.to_wire()?)
    }

    fn notify_source(&self, request: &B2BRequest, kind: NotificationKind) {
        let (Some(seller), Some(source)) = (request.business_id(), request.source()) else {
            return;
        };
        self.notify(seller, source.business_id, kind, &request.id_typed().0);
    }

    /// Carry a seller action over to the buyer's order. Lost races against
    /// the buyer's own writes are retried.
    fn follow_on_buyer_side(&self, request: &B2BRequest, target: PoStatus, actor: &Actor, note: Option<String>) {
        let (Some(source), Some(order_id)) = (request.source(), request.original_po_id()) else {
            return;
        };
        let buyer = source.business_id;
        let attempts = self.config.commit_retry_limit.max(1);

        for attempt in 1..=attempts {
            let cmd = transition_cmd(buyer, order_id, target, actor, note.clone(), request.courier().cloned());
            match self.execute_order(buyer, order_id, cmd) {
                Ok((order, _)) => {
                    info!(business_id = %buyer, %order_id, status = %target, attempt, "buyer order followed seller");
                    if order.status() == PoStatus::Rejected {
                        if let Err(err) = self.release_budget(buyer, &order) {
                            warn!(business_id = %buyer, %order_id, error = %err, "rejected order kept its budget spend");
                        }
                    }
                    return;
                }
                Err(EngineError::ConcurrencyConflict(_)) => std::thread::yield_now(),
                Err(err) => {
                    warn!(business_id = %buyer, %order_id, status = %target, error = %err, "buyer order could not follow seller");
                    return;
                }
            }
        }
        warn!(business_id = %buyer, %order_id, status = %target, attempts, "buyer order did not follow seller");
    }
}

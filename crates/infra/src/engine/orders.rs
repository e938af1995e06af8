//! Buyer-side order operations: submit, approval, transitions and
//! transmission to the seller.

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use procureflow_core::BusinessId;
use procureflow_events::{EventBus, EventEnvelope};
use procureflow_purchasing::{
    Actor, Advisory, B2BLink, B2BRequestCommand, B2BRequestId, BusinessRef, CourierDetails,
    OrderDraft, OrderLine, OrderMode, PoStatus, PurchaseOrder, PurchaseOrderCommand,
    PurchaseOrderId, ReceiveRequest, RiskAdvisory, SaveDraft, SubmitOrder, SupplierRef,
    TransitionOrder, line,
};

use super::{EngineError, EngineResult, ProcurementEngine};
use crate::event_store::EventStore;
use crate::services::NotificationKind;

/// Result of a submission. Advisories never block; they ride along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub order: PurchaseOrder,
    pub advisories: Vec<Advisory>,
    /// The order is parked in `pending_approval` until an owner or manager acts.
    pub approval_required: bool,
    /// Seller-side id when the order was mirrored to a network supplier.
    pub b2b_request_id: Option<B2BRequestId>,
    /// The order is `ordered` but its budget commit or transmission did not
    /// go through. `retransmit` finishes the job.
    pub transmission_pending: bool,
}

impl SubmitOutcome {
    /// The placed order, or `ApprovalRequired` when it still waits for sign-off.
    pub fn ensure_ordered(self) -> EngineResult<PurchaseOrder> {
        if self.approval_required {
            return Err(EngineError::ApprovalRequired {
                order_id: self.order.id_typed().to_string(),
            });
        }
        Ok(self.order)
    }
}

impl<S, B> ProcurementEngine<S, B>
where
    S: EventStore + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    /// Keep a draft for later. Lines are not validated until submit.
    pub fn save_draft(&self, buyer: &BusinessRef, draft: OrderDraft, actor: &Actor) -> EngineResult<PurchaseOrder> {
        if draft.mode != OrderMode::Po {
            return Err(EngineError::validation(
                "purchase requests are recorded with submit_request, not as drafts",
            ));
        }
        let order_id = draft.order_id.clone().unwrap_or_else(PurchaseOrderId::generate);
        let _ticket = self.in_flight.try_acquire(buyer.business_id, &order_id.0)?;

        let cmd = PurchaseOrderCommand::SaveDraft(SaveDraft {
            business_id: buyer.business_id,
            outlet_id: buyer.outlet_id,
            order_id: order_id.clone(),
            supplier: draft.supplier,
            lines: draft.lines,
            actor: actor.clone(),
            note: draft.note,
            occurred_at: Utc::now(),
        });
        let (order, _) = self.execute_order(buyer.business_id, &order_id, cmd)?;
        info!(business_id = %buyer.business_id, %order_id, "draft saved");
        Ok(order)
    }

    /// Place an order with one supplier.
    ///
    /// Creates the order when the draft carries no saved id. Orders above the
    /// approval limit placed by staff stop at `pending_approval`; everything
    /// else is `ordered` straight away, committed against the budget and, for
    /// network-verified suppliers, mirrored into the seller's inbox.
    ///
    /// Once the order is `ordered` it stays that way: a failed budget commit
    /// or transmission is logged and reported through
    /// [`SubmitOutcome::transmission_pending`] rather than as an error.
    pub fn submit(&self, buyer: &BusinessRef, draft: OrderDraft, actor: &Actor) -> EngineResult<SubmitOutcome> {
        if draft.mode != OrderMode::Po {
            return Err(EngineError::validation(
                "purchase requests are recorded with submit_request, not submitted as orders",
            ));
        }
        let order_id = draft.order_id.clone().unwrap_or_else(PurchaseOrderId::generate);
        let _ticket = self.in_flight.try_acquire(buyer.business_id, &order_id.0)?;
        self.submit_locked(buyer, order_id, draft, actor, false)
    }

    /// `park` sends the order to approval even when routing would not.
    fn submit_locked(
        &self,
        buyer: &BusinessRef,
        order_id: PurchaseOrderId,
        draft: OrderDraft,
        actor: &Actor,
        park: bool,
    ) -> EngineResult<SubmitOutcome> {
        let total = line::validate_lines(&draft.lines, draft.declared_total)?;
        let advisories = self.submission_advisories(buyer.business_id, &draft.lines, &draft.supplier)?;
        let requires_approval = park || self.router.requires_approval(total, actor.role, draft.mode);

        let b2b = match draft.supplier.b2b_target() {
            Some(target) if target.business_id == buyer.business_id => {
                return Err(EngineError::validation(format!(
                    "supplier '{}' is linked to the buying business itself",
                    draft.supplier.name
                )));
            }
            Some(target) => Some(B2BLink {
                request_id: B2BRequestId::for_order(&order_id),
                seller_business_id: target.business_id,
                seller_outlet_id: target.outlet_id,
            }),
            None => None,
        };

        let cmd = PurchaseOrderCommand::SubmitOrder(SubmitOrder {
            business_id: buyer.business_id,
            outlet_id: buyer.outlet_id,
            order_id: order_id.clone(),
            supplier: draft.supplier,
            lines: draft.lines,
            declared_total: draft.declared_total,
            mode: draft.mode,
            requires_approval,
            b2b,
            actor: actor.clone(),
            note: draft.note,
            occurred_at: Utc::now(),
        });
        let (order, events) = self.execute_order(buyer.business_id, &order_id, cmd)?;
        info!(
            business_id = %buyer.business_id,
            %order_id,
            status = %order.status(),
            %total,
            advisories = advisories.len(),
            "purchase order submitted"
        );

        let mut transmission_pending = false;
        if !events.is_empty() && order.status() == PoStatus::Ordered {
            if let Err(err) = self.place_order(buyer, &order) {
                warn!(business_id = %buyer.business_id, %order_id, error = %err, "order placed but not transmitted");
                transmission_pending = true;
            }
        }

        let approval_required = order.status() == PoStatus::PendingApproval;
        let b2b_request_id = order.b2b_link().map(|link| link.request_id.clone());
        Ok(SubmitOutcome {
            order,
            advisories,
            approval_required,
            b2b_request_id,
            transmission_pending,
        })
    }

    /// Submit a saved draft towards `target`, with the lines, supplier and
    /// note it was saved with.
    fn submit_saved_draft(
        &self,
        buyer: &BusinessRef,
        order: &PurchaseOrder,
        target: PoStatus,
        actor: &Actor,
    ) -> EngineResult<PurchaseOrder> {
        let order_id = order.id_typed().clone();
        let supplier = order
            .supplier()
            .cloned()
            .ok_or_else(|| EngineError::validation(format!("draft {order_id} has no supplier")))?;
        let mut draft = OrderDraft::new(supplier, order.lines().to_vec()).with_order_id(order_id.clone());
        draft.note = order.note().map(str::to_string);

        let park = target == PoStatus::PendingApproval;
        let total = line::validate_lines(&draft.lines, None)?;
        if !park && self.router.requires_approval(total, actor.role, draft.mode) {
            return Err(EngineError::ApprovalRequired {
                order_id: order_id.to_string(),
            });
        }
        Ok(self.submit_locked(buyer, order_id, draft, actor, park)?.order)
    }

    /// Move an order along the buyer graph.
    ///
    /// Anything the graph does not allow fails with `InvalidTransition`.
    /// Allowed targets are routed to the operation that owns them; a draft
    /// moved to `pending_approval` or `ordered` is submitted as saved, and
    /// `ordered` is refused with `ApprovalRequired` when the actor's order
    /// needs sign-off.
    pub fn transition(
        &self,
        buyer: &BusinessRef,
        order_id: &PurchaseOrderId,
        target: PoStatus,
        actor: &Actor,
        note: Option<String>,
    ) -> EngineResult<PurchaseOrder> {
        let _ticket = self.in_flight.try_acquire(buyer.business_id, &order_id.0)?;
        let order = self.load_order(buyer.business_id, order_id)?;
        let current = order.status();
        if current != target && !current.can_transition_to(target) {
            return Err(EngineError::InvalidTransition {
                from: current.to_string(),
                to: target.to_string(),
            });
        }

        match target {
            PoStatus::Draft => Ok(order),
            PoStatus::PendingApproval | PoStatus::Ordered if current == PoStatus::Draft => {
                self.submit_saved_draft(buyer, &order, target, actor)
            }
            PoStatus::PendingApproval => Ok(order),
            PoStatus::Ordered => self.approve_locked(buyer, order, actor),
            PoStatus::Shipped => self.mark_shipped_locked(buyer.business_id, order, actor, None),
            PoStatus::Received => Err(EngineError::validation(
                "goods are received through a receiving session",
            )),
            PoStatus::Cancelled if current == PoStatus::PendingApproval => {
                self.reject_locked(buyer.business_id, order_id, actor, note.as_deref().unwrap_or_default())
            }
            PoStatus::Cancelled => self.cancel_locked(buyer.business_id, order_id, actor, note),
            PoStatus::Rejected => Err(EngineError::validation(
                "only the seller can reject a placed order",
            )),
        }
    }

    /// Approve a parked order. Commits the budget and transmits it.
    ///
    /// When the commit or transmission fails the error is returned but the
    /// order stays `ordered`; `retransmit` finishes it.
    pub fn approve(&self, buyer: &BusinessRef, order_id: &PurchaseOrderId, approver: &Actor) -> EngineResult<PurchaseOrder> {
        self.router.authorize_approver(approver)?;
        let _ticket = self.in_flight.try_acquire(buyer.business_id, &order_id.0)?;
        let order = self.load_order(buyer.business_id, order_id)?;
        self.approve_locked(buyer, order, approver)
    }

    /// Turn a parked order down. The order stays visible as `cancelled`.
    pub fn reject(
        &self,
        business_id: BusinessId,
        order_id: &PurchaseOrderId,
        approver: &Actor,
        reason: &str,
    ) -> EngineResult<PurchaseOrder> {
        self.router.authorize_approver(approver)?;
        let _ticket = self.in_flight.try_acquire(business_id, &order_id.0)?;
        self.reject_locked(business_id, order_id, approver, reason)
    }

    /// Withdraw a draft.
    pub fn cancel(
        &self,
        business_id: BusinessId,
        order_id: &PurchaseOrderId,
        actor: &Actor,
        note: Option<String>,
    ) -> EngineResult<PurchaseOrder> {
        let _ticket = self.in_flight.try_acquire(business_id, &order_id.0)?;
        self.cancel_locked(business_id, order_id, actor, note)
    }

    /// Record dispatch of a manual order. B2B orders follow the seller instead.
    pub fn mark_shipped(
        &self,
        business_id: BusinessId,
        order_id: &PurchaseOrderId,
        actor: &Actor,
        courier: Option<CourierDetails>,
    ) -> EngineResult<PurchaseOrder> {
        let _ticket = self.in_flight.try_acquire(business_id, &order_id.0)?;
        let order = self.load_order(business_id, order_id)?;
        self.mark_shipped_locked(business_id, order, actor, courier)
    }

    /// Re-run the side effects of placing an order: budget commit and
    /// transmission. Both are keyed by the order id, so nothing lands twice.
    pub fn retransmit(&self, buyer: &BusinessRef, order_id: &PurchaseOrderId) -> EngineResult<PurchaseOrder> {
        let _ticket = self.in_flight.try_acquire(buyer.business_id, &order_id.0)?;
        let order = self.load_order(buyer.business_id, order_id)?;
        if order.status() != PoStatus::Ordered {
            return Err(EngineError::validation(format!(
                "only ordered purchase orders are transmitted (order {order_id} is {})",
                order.status()
            )));
        }
        self.place_order(buyer, &order)?;
        Ok(order)
    }

    fn approve_locked(&self, buyer: &BusinessRef, order: PurchaseOrder, approver: &Actor) -> EngineResult<PurchaseOrder> {
        let order_id = order.id_typed().clone();
        if !matches!(order.status(), PoStatus::PendingApproval | PoStatus::Ordered) {
            return Err(EngineError::InvalidTransition {
                from: order.status().to_string(),
                to: PoStatus::Ordered.to_string(),
            });
        }

        let (order, events) = self.execute_order(
            buyer.business_id,
            &order_id,
            transition_cmd(buyer.business_id, &order_id, PoStatus::Ordered, approver, None, None),
        )?;
        if !events.is_empty() {
            info!(business_id = %buyer.business_id, %order_id, approver = %approver.name, "purchase order approved");
            self.place_order(buyer, &order)?;
        }
        Ok(order)
    }

    fn reject_locked(
        &self,
        business_id: BusinessId,
        order_id: &PurchaseOrderId,
        approver: &Actor,
        reason: &str,
    ) -> EngineResult<PurchaseOrder> {
        if reason.trim().is_empty() {
            return Err(EngineError::validation("rejection reason is required"));
        }
        let order = self.load_order(business_id, order_id)?;
        if !matches!(order.status(), PoStatus::PendingApproval | PoStatus::Cancelled) {
            return Err(EngineError::InvalidTransition {
                from: order.status().to_string(),
                to: PoStatus::Cancelled.to_string(),
            });
        }

        let (order, events) = self.execute_order(
            business_id,
            order_id,
            transition_cmd(business_id, order_id, PoStatus::Cancelled, approver, Some(reason.to_string()), None),
        )?;
        if !events.is_empty() {
            info!(%business_id, %order_id, approver = %approver.name, reason, "purchase order rejected");
        }
        Ok(order)
    }

    fn cancel_locked(
        &self,
        business_id: BusinessId,
        order_id: &PurchaseOrderId,
        actor: &Actor,
        note: Option<String>,
    ) -> EngineResult<PurchaseOrder> {
        let (order, events) = self.execute_order(
            business_id,
            order_id,
            transition_cmd(business_id, order_id, PoStatus::Cancelled, actor, note, None),
        )?;
        if !events.is_empty() {
            info!(%business_id, %order_id, "purchase order cancelled");
        }
        Ok(order)
    }

    fn mark_shipped_locked(
        &self,
        business_id: BusinessId,
        order: PurchaseOrder,
        actor: &Actor,
        courier: Option<CourierDetails>,
    ) -> EngineResult<PurchaseOrder> {
        let order_id = order.id_typed().clone();
        if order.is_b2b() {
            return Err(EngineError::validation(format!(
                "B2B orders are shipped by the seller (order {order_id})"
            )));
        }
        let (order, events) = self.execute_order(
            business_id,
            &order_id,
            transition_cmd(business_id, &order_id, PoStatus::Shipped, actor, None, courier),
        )?;
        if !events.is_empty() {
            info!(%business_id, %order_id, "purchase order shipped");
        }
        Ok(order)
    }

    /// Budget commit per category, then transmission.
    fn place_order(&self, buyer: &BusinessRef, order: &PurchaseOrder) -> EngineResult<()> {
        let reference = order.id_typed().to_string();
        for (category, amount) in self.attributed_totals(buyer.business_id, order.lines())? {
            if let Some(envelope) = self.budget.commit(buyer.business_id, &category, amount, &reference)? {
                info!(
                    business_id = %buyer.business_id,
                    order_id = %reference,
                    category,
                    spent = %envelope.spent(),
                    limit = %envelope.limit(),
                    "budget spend committed"
                );
            }
        }
        self.transmit(buyer, order)
    }

    /// Hand back what the order committed to each category envelope.
    pub(super) fn release_budget(&self, business_id: BusinessId, order: &PurchaseOrder) -> EngineResult<()> {
        let reference = order.id_typed().to_string();
        for (category, _) in self.attributed_totals(business_id, order.lines())? {
            if let Some(envelope) = self.budget.release(business_id, &category, &reference)? {
                info!(
                    %business_id,
                    order_id = %reference,
                    category,
                    spent = %envelope.spent(),
                    limit = %envelope.limit(),
                    "budget spend released"
                );
            }
        }
        Ok(())
    }

    fn transmit(&self, buyer: &BusinessRef, order: &PurchaseOrder) -> EngineResult<()> {
        let order_id = order.id_typed();
        let Some(link) = order.b2b_link() else {
            let recipient = order
                .supplier()
                .map(|s| s.partner_id.to_string())
                .unwrap_or_default();
            info!(business_id = %buyer.business_id, %order_id, supplier = %recipient, "order needs manual dispatch");
            self.notify(buyer.business_id, recipient, NotificationKind::ManualDispatch, &order_id.0);
            return Ok(());
        };

        let cmd = B2BRequestCommand::ReceiveRequest(ReceiveRequest {
            business_id: link.seller_business_id,
            request_id: link.request_id.clone(),
            target_outlet_id: link.seller_outlet_id,
            source: buyer.clone(),
            original_po_id: order_id.clone(),
            items: order.lines().to_vec(),
            total_amount: order.total_estimated(),
            note: order.note().map(str::to_string),
            occurred_at: Utc::now(),
        });
        let (_, events) = self.execute_request(link.seller_business_id, &link.request_id, cmd)?;
        if events.is_empty() {
            debug!(%order_id, request_id = %link.request_id, "order already transmitted");
            return Ok(());
        }

        info!(
            business_id = %buyer.business_id,
            %order_id,
            seller = %link.seller_business_id,
            request_id = %link.request_id,
            "order transmitted to seller"
        );
        self.notify(
            buyer.business_id,
            link.seller_business_id,
            NotificationKind::OrderSent,
            &link.request_id.0,
        );
        Ok(())
    }

    fn submission_advisories(
        &self,
        business_id: BusinessId,
        lines: &[OrderLine],
        supplier: &SupplierRef,
    ) -> EngineResult<Vec<Advisory>> {
        let mut advisories = Vec::new();
        for (category, amount) in self.attributed_totals(business_id, lines)? {
            let Some(assessment) = self.budget.assess(business_id, &category, amount)? else {
                continue;
            };
            if assessment.is_over_budget() {
                if self.config.enforce_budget {
                    return Err(EngineError::BudgetExceeded {
                        category,
                        projected: assessment.projected_spend,
                        limit: assessment.limit,
                    });
                }
                warn!(
                    %business_id,
                    category,
                    projected = %assessment.projected_spend,
                    limit = %assessment.limit,
                    "order goes over budget"
                );
            }
            if assessment.level.is_some() {
                advisories.push(Advisory::Budget(assessment));
            }
        }

        if supplier.score.is_risky(self.config.risk_score_threshold) {
            advisories.push(Advisory::Risk(RiskAdvisory {
                partner_id: supplier.partner_id.clone(),
                supplier_name: supplier.name.clone(),
                score: supplier.score,
            }));
        }
        Ok(advisories)
    }
}

pub(super) fn transition_cmd(
    business_id: BusinessId,
    order_id: &PurchaseOrderId,
    target: PoStatus,
    actor: &Actor,
    note: Option<String>,
    courier: Option<CourierDetails>,
) -> PurchaseOrderCommand {
    PurchaseOrderCommand::TransitionOrder(TransitionOrder {
        business_id,
        order_id: order_id.clone(),
        target,
        actor: actor.clone(),
        note,
        courier,
        occurred_at: Utc::now(),
    })
}

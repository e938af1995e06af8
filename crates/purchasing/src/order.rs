use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procureflow_core::{
    Aggregate, AggregateId, AggregateRoot, Amount, BusinessId, DomainError, DomainResult, OutletId,
    UserId,
};
use procureflow_events::Event;

use crate::approval::{Actor, OrderMode};
use crate::b2b::{B2BRequestId, CourierDetails};
use crate::counterparty::SupplierRef;
use crate::history::{HistoryAction, HistoryLog};
use crate::line::{self, OrderLine};
use crate::receiving::{PaymentStatus, ReceivingOutcome, Settlement};

/// Purchase order identifier (buyer-owned stream).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::generate("PO"))
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Buyer-side status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoStatus {
    Draft,
    PendingApproval,
    Ordered,
    Shipped,
    Received,
    Cancelled,
    /// The seller declined the mirrored request.
    Rejected,
}

impl PoStatus {
    /// Direct successors in the buyer graph.
    pub fn successors(self) -> &'static [PoStatus] {
        use PoStatus::*;
        match self {
            Draft => &[PendingApproval, Ordered, Cancelled],
            PendingApproval => &[Ordered, Cancelled],
            Ordered => &[Shipped, Rejected],
            Shipped => &[Received],
            Received | Cancelled | Rejected => &[],
        }
    }

    pub fn can_transition_to(self, target: PoStatus) -> bool {
        self.successors().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PoStatus::Draft => "draft",
            PoStatus::PendingApproval => "pending_approval",
            PoStatus::Ordered => "ordered",
            PoStatus::Shipped => "shipped",
            PoStatus::Received => "received",
            PoStatus::Cancelled => "cancelled",
            PoStatus::Rejected => "rejected",
        }
    }
}

impl core::fmt::Display for PoStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link from a buyer PO to its mirror in the seller's inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct B2BLink {
    pub request_id: B2BRequestId,
    pub seller_business_id: BusinessId,
    pub seller_outlet_id: OutletId,
}

/// Aggregate root: PurchaseOrder (buyer-owned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    business_id: Option<BusinessId>,
    outlet_id: Option<OutletId>,
    supplier: Option<SupplierRef>,
    lines: Vec<OrderLine>,
    total_estimated: Amount,
    status: PoStatus,
    payment_status: PaymentStatus,
    created_by: Option<Actor>,
    order_date: Option<DateTime<Utc>>,
    received_by: Option<String>,
    received_date: Option<DateTime<Utc>>,
    b2b: Option<B2BLink>,
    courier: Option<CourierDetails>,
    settlement: Option<Settlement>,
    total_bill: Option<Amount>,
    due_date: Option<DateTime<Utc>>,
    note: Option<String>,
    history: HistoryLog,
    /// Who moved the order into its current status.
    status_actor: Option<UserId>,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            business_id: None,
            outlet_id: None,
            supplier: None,
            lines: Vec::new(),
            total_estimated: Decimal::ZERO,
            status: PoStatus::Draft,
            payment_status: PaymentStatus::Unpaid,
            created_by: None,
            order_date: None,
            received_by: None,
            received_date: None,
            b2b: None,
            courier: None,
            settlement: None,
            total_bill: None,
            due_date: None,
            note: None,
            history: HistoryLog::new(),
            status_actor: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> &PurchaseOrderId {
        &self.id
    }

    pub fn business_id(&self) -> Option<BusinessId> {
        self.business_id
    }

    pub fn outlet_id(&self) -> Option<OutletId> {
        self.outlet_id
    }

    pub fn supplier(&self) -> Option<&SupplierRef> {
        self.supplier.as_ref()
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn total_estimated(&self) -> Amount {
        self.total_estimated
    }

    pub fn status(&self) -> PoStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn created_by(&self) -> Option<&Actor> {
        self.created_by.as_ref()
    }

    pub fn order_date(&self) -> Option<DateTime<Utc>> {
        self.order_date
    }

    pub fn received_by(&self) -> Option<&str> {
        self.received_by.as_deref()
    }

    pub fn received_date(&self) -> Option<DateTime<Utc>> {
        self.received_date
    }

    pub fn is_b2b(&self) -> bool {
        self.b2b.is_some()
    }

    pub fn b2b_link(&self) -> Option<&B2BLink> {
        self.b2b.as_ref()
    }

    pub fn courier(&self) -> Option<&CourierDetails> {
        self.courier.as_ref()
    }

    pub fn settlement(&self) -> Option<&Settlement> {
        self.settlement.as_ref()
    }

    pub fn total_bill(&self) -> Option<Amount> {
        self.total_bill
    }

    pub fn due_date(&self) -> Option<DateTime<Utc>> {
        self.due_date
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Committed total per catalog category, in first-seen order.
    pub fn category_totals(&self) -> DomainResult<Vec<(String, Amount)>> {
        line::category_totals(&self.lines, |l| l.category.clone())
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: SaveDraft (a composed order kept for later submission).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveDraft {
    pub business_id: BusinessId,
    pub outlet_id: OutletId,
    pub order_id: PurchaseOrderId,
    pub supplier: SupplierRef,
    pub lines: Vec<OrderLine>,
    pub actor: Actor,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitOrder.
///
/// Creates the order if it does not exist yet, otherwise submits the saved
/// draft with the given lines. Routing is decided by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOrder {
    pub business_id: BusinessId,
    pub outlet_id: OutletId,
    pub order_id: PurchaseOrderId,
    pub supplier: SupplierRef,
    pub lines: Vec<OrderLine>,
    /// Total shown to the user; must agree with the lines.
    pub declared_total: Option<Amount>,
    pub mode: OrderMode,
    pub requires_approval: bool,
    pub b2b: Option<B2BLink>,
    pub actor: Actor,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransitionOrder (approve, reject, cancel, ship, seller rejection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOrder {
    pub business_id: BusinessId,
    pub order_id: PurchaseOrderId,
    pub target: PoStatus,
    pub actor: Actor,
    pub note: Option<String>,
    pub courier: Option<CourierDetails>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveGoods (completes a receiving session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveGoods {
    pub business_id: BusinessId,
    pub order_id: PurchaseOrderId,
    pub outcome: ReceivingOutcome,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    SaveDraft(SaveDraft),
    SubmitOrder(SubmitOrder),
    TransitionOrder(TransitionOrder),
    ReceiveGoods(ReceiveGoods),
}

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub business_id: BusinessId,
    pub outlet_id: OutletId,
    pub order_id: PurchaseOrderId,
    pub supplier: SupplierRef,
    pub lines: Vec<OrderLine>,
    pub total_estimated: Amount,
    pub created_by: Actor,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderSubmitted {
    pub business_id: BusinessId,
    pub order_id: PurchaseOrderId,
    pub lines: Vec<OrderLine>,
    pub total_estimated: Amount,
    /// `pending_approval` or `ordered`.
    pub status: PoStatus,
    pub b2b: Option<B2BLink>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderStatusChanged {
    pub business_id: BusinessId,
    pub order_id: PurchaseOrderId,
    pub from: PoStatus,
    pub to: PoStatus,
    pub actor: Actor,
    pub note: Option<String>,
    pub courier: Option<CourierDetails>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsReceived.
///
/// Carries the reconciled lines; stock and journal entries are booked from
/// it by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceived {
    pub business_id: BusinessId,
    pub order_id: PurchaseOrderId,
    pub lines: Vec<OrderLine>,
    pub total_bill: Amount,
    pub settlement: Settlement,
    pub payment_status: PaymentStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub actor: Actor,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    PurchaseOrderSubmitted(PurchaseOrderSubmitted),
    PurchaseOrderStatusChanged(PurchaseOrderStatusChanged),
    GoodsReceived(GoodsReceived),
}

impl PurchaseOrderEvent {
    /// Status the order is in after this event.
    pub fn resulting_status(&self) -> PoStatus {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => PoStatus::Draft,
            PurchaseOrderEvent::PurchaseOrderSubmitted(e) => e.status,
            PurchaseOrderEvent::PurchaseOrderStatusChanged(e) => e.to,
            PurchaseOrderEvent::GoodsReceived(_) => PoStatus::Received,
        }
    }
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::PurchaseOrderSubmitted(_) => "purchasing.order.submitted",
            PurchaseOrderEvent::PurchaseOrderStatusChanged(_) => "purchasing.order.status_changed",
            PurchaseOrderEvent::GoodsReceived(_) => "purchasing.order.goods_received",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderSubmitted(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderStatusChanged(e) => e.occurred_at,
            PurchaseOrderEvent::GoodsReceived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id.clone();
                self.business_id = Some(e.business_id);
                self.outlet_id = Some(e.outlet_id);
                self.supplier = Some(e.supplier.clone());
                self.lines = e.lines.clone();
                self.total_estimated = e.total_estimated;
                self.status = PoStatus::Draft;
                self.created_by = Some(e.created_by.clone());
                self.note = e.note.clone();
                self.status_actor = Some(e.created_by.user_id);
                self.history.append(
                    e.occurred_at,
                    HistoryAction::Created,
                    e.created_by.name.clone(),
                    "draft created",
                );
                self.created = true;
            }
            PurchaseOrderEvent::PurchaseOrderSubmitted(e) => {
                self.lines = e.lines.clone();
                self.total_estimated = e.total_estimated;
                self.status = e.status;
                self.b2b = e.b2b.clone();
                self.order_date = Some(e.occurred_at);
                self.status_actor = Some(e.actor.user_id);
                let note = match (e.status, &e.b2b) {
                    (PoStatus::PendingApproval, _) => "submitted for approval".to_string(),
                    (_, Some(link)) => format!("order sent to seller as {}", link.request_id),
                    (_, None) => "order placed".to_string(),
                };
                self.history
                    .append(e.occurred_at, HistoryAction::Sent, e.actor.name.clone(), note);
            }
            PurchaseOrderEvent::PurchaseOrderStatusChanged(e) => {
                self.status = e.to;
                self.status_actor = Some(e.actor.user_id);
                if e.courier.is_some() {
                    self.courier = e.courier.clone();
                }
                let note = match &e.note {
                    Some(note) => format!("{} -> {}: {note}", e.from, e.to),
                    None => format!("{} -> {}", e.from, e.to),
                };
                self.history
                    .append(e.occurred_at, HistoryAction::Updated, e.actor.name.clone(), note);
            }
            PurchaseOrderEvent::GoodsReceived(e) => {
                self.lines = e.lines.clone();
                self.status = PoStatus::Received;
                self.payment_status = e.payment_status;
                self.settlement = Some(e.settlement.clone());
                self.total_bill = Some(e.total_bill);
                self.due_date = e.due_date;
                self.received_by = Some(e.actor.name.clone());
                self.received_date = Some(e.occurred_at);
                self.status_actor = Some(e.actor.user_id);
                let note = match &e.note {
                    Some(note) => format!("billed {} ({}): {note}", e.total_bill, e.settlement.method()),
                    None => format!("billed {} ({})", e.total_bill, e.settlement.method()),
                };
                self.history
                    .append(e.occurred_at, HistoryAction::Received, e.actor.name.clone(), note);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::SaveDraft(cmd) => self.handle_save_draft(cmd),
            PurchaseOrderCommand::SubmitOrder(cmd) => self.handle_submit(cmd),
            PurchaseOrderCommand::TransitionOrder(cmd) => self.handle_transition(cmd),
            PurchaseOrderCommand::ReceiveGoods(cmd) => self.handle_receive(cmd),
        }
    }
}

impl PurchaseOrder {
    fn ensure_business(&self, business_id: BusinessId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.business_id != Some(business_id) {
            return Err(DomainError::invariant("business mismatch"));
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: &PurchaseOrderId) -> Result<(), DomainError> {
        if &self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, business_id: BusinessId, order_id: &PurchaseOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_business(business_id)?;
        self.ensure_order_id(order_id)
    }

    /// Re-requesting the current status: a no-op for the actor who set it,
    /// a stale request for anyone else.
    fn repeat_of_current(&self, target: PoStatus, actor: &Actor) -> Result<bool, DomainError> {
        if self.status != target {
            return Ok(false);
        }
        if self.status_actor == Some(actor.user_id) {
            return Ok(true);
        }
        Err(DomainError::invalid_transition(self.status, target))
    }

    fn handle_save_draft(&self, cmd: &SaveDraft) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!(
                "purchase order {} already exists",
                cmd.order_id
            )));
        }
        let total = line::lines_total(&cmd.lines)?;

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(
            PurchaseOrderCreated {
                business_id: cmd.business_id,
                outlet_id: cmd.outlet_id,
                order_id: cmd.order_id.clone(),
                supplier: cmd.supplier.clone(),
                lines: cmd.lines.clone(),
                total_estimated: total,
                created_by: cmd.actor.clone(),
                note: cmd.note.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_submit(&self, cmd: &SubmitOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_business(cmd.business_id)?;

        if cmd.mode != OrderMode::Po {
            return Err(DomainError::validation(
                "purchase requests are recorded as requests, not orders",
            ));
        }

        let target = if cmd.requires_approval {
            PoStatus::PendingApproval
        } else {
            PoStatus::Ordered
        };

        if self.created {
            self.ensure_order_id(&cmd.order_id)?;
            if self.repeat_of_current(target, &cmd.actor)? {
                return Ok(vec![]);
            }
            if self.status != PoStatus::Draft {
                return Err(DomainError::invalid_transition(self.status, target));
            }
        }

        let total = line::validate_lines(&cmd.lines, cmd.declared_total)?;

        let mut events = Vec::with_capacity(2);
        if !self.created {
            events.push(PurchaseOrderEvent::PurchaseOrderCreated(
                PurchaseOrderCreated {
                    business_id: cmd.business_id,
                    outlet_id: cmd.outlet_id,
                    order_id: cmd.order_id.clone(),
                    supplier: cmd.supplier.clone(),
                    lines: cmd.lines.clone(),
                    total_estimated: total,
                    created_by: cmd.actor.clone(),
                    note: cmd.note.clone(),
                    occurred_at: cmd.occurred_at,
                },
            ));
        }
        events.push(PurchaseOrderEvent::PurchaseOrderSubmitted(
            PurchaseOrderSubmitted {
                business_id: cmd.business_id,
                order_id: cmd.order_id.clone(),
                lines: cmd.lines.clone(),
                total_estimated: total,
                status: target,
                b2b: cmd.b2b.clone(),
                actor: cmd.actor.clone(),
                occurred_at: cmd.occurred_at,
            },
        ));
        Ok(events)
    }

    fn handle_transition(
        &self,
        cmd: &TransitionOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.business_id, &cmd.order_id)?;

        if self.repeat_of_current(cmd.target, &cmd.actor)? {
            return Ok(vec![]);
        }
        if !self.status.can_transition_to(cmd.target) {
            return Err(DomainError::invalid_transition(self.status, cmd.target));
        }

        match (self.status, cmd.target) {
            (_, PoStatus::Received) => {
                return Err(DomainError::validation(
                    "goods are received through a receiving session",
                ));
            }
            (PoStatus::PendingApproval, _) if !cmd.actor.role.can_approve() => {
                return Err(DomainError::unauthorized(format!(
                    "role `{}` cannot approve or reject purchase orders",
                    cmd.actor.role
                )));
            }
            (PoStatus::PendingApproval, PoStatus::Cancelled) => {
                let has_reason = cmd.note.as_deref().is_some_and(|n| !n.trim().is_empty());
                if !has_reason {
                    return Err(DomainError::validation("rejection reason is required"));
                }
            }
            _ => {}
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderStatusChanged(
            PurchaseOrderStatusChanged {
                business_id: cmd.business_id,
                order_id: cmd.order_id.clone(),
                from: self.status,
                to: cmd.target,
                actor: cmd.actor.clone(),
                note: cmd.note.clone(),
                courier: cmd.courier.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_receive(&self, cmd: &ReceiveGoods) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.business_id, &cmd.order_id)?;

        if self.repeat_of_current(PoStatus::Received, &cmd.actor)? {
            return Ok(vec![]);
        }
        if self.status != PoStatus::Shipped {
            return Err(DomainError::invalid_transition(self.status, PoStatus::Received));
        }
        if cmd.outcome.order_id != self.id.0 {
            return Err(DomainError::invariant("receiving session belongs to another order"));
        }

        let lines = cmd.outcome.received_lines();
        if lines.len() != self.lines.len()
            || lines
                .iter()
                .zip(&self.lines)
                .any(|(r, o)| r.item_id != o.item_id || r.quantity != o.quantity)
        {
            return Err(DomainError::invariant(
                "received lines do not match the ordered lines",
            ));
        }

        Ok(vec![PurchaseOrderEvent::GoodsReceived(GoodsReceived {
            business_id: cmd.business_id,
            order_id: cmd.order_id.clone(),
            lines,
            total_bill: cmd.outcome.total_bill,
            settlement: cmd.outcome.settlement.clone(),
            payment_status: cmd.outcome.payment_status,
            due_date: cmd.outcome.due_date,
            actor: cmd.actor.clone(),
            note: cmd.outcome.note.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::approval::Role;
    use procureflow_core::money;
    use procureflow_partners::{PartnerId, PerformanceScore};
    use proptest::prelude::*;

    pub(crate) fn d(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    pub(crate) fn staff() -> Actor {
        Actor::new(UserId::new(), "Budi", Role::Staff)
    }

    pub(crate) fn manager() -> Actor {
        Actor::new(UserId::new(), "Sari", Role::Manager)
    }

    pub(crate) fn supplier() -> SupplierRef {
        SupplierRef {
            partner_id: PartnerId::new(AggregateId::from("SUP-1")),
            name: "Dairy Farm".to_string(),
            linked: None,
            network_verified: false,
            score: PerformanceScore::default(),
        }
    }

    pub(crate) fn milk(quantity: i64, cost: i64) -> OrderLine {
        OrderLine::new("ING-MILK", "Fresh Milk", "l", d(quantity), d(cost), "Dairy")
    }

    pub(crate) fn submit_cmd(
        business_id: BusinessId,
        order_id: &PurchaseOrderId,
        lines: Vec<OrderLine>,
        requires_approval: bool,
        actor: &Actor,
    ) -> PurchaseOrderCommand {
        PurchaseOrderCommand::SubmitOrder(SubmitOrder {
            business_id,
            outlet_id: OutletId::new(),
            order_id: order_id.clone(),
            supplier: supplier(),
            lines,
            declared_total: None,
            mode: OrderMode::Po,
            requires_approval,
            b2b: None,
            actor: actor.clone(),
            note: None,
            occurred_at: Utc::now(),
        })
    }

    pub(crate) fn transition_cmd(
        business_id: BusinessId,
        order_id: &PurchaseOrderId,
        target: PoStatus,
        actor: &Actor,
        note: Option<&str>,
    ) -> PurchaseOrderCommand {
        PurchaseOrderCommand::TransitionOrder(TransitionOrder {
            business_id,
            order_id: order_id.clone(),
            target,
            actor: actor.clone(),
            note: note.map(str::to_string),
            courier: None,
            occurred_at: Utc::now(),
        })
    }

    pub(crate) fn run(order: &mut PurchaseOrder, cmd: PurchaseOrderCommand) -> Result<usize, DomainError> {
        let events = order.handle(&cmd)?;
        for ev in &events {
            order.apply(ev);
        }
        Ok(events.len())
    }

    /// A submitted-and-shipped order, ready for receiving.
    pub(crate) fn shipped_order(lines: Vec<OrderLine>) -> (BusinessId, PurchaseOrder, Actor) {
        let business_id = BusinessId::new();
        let order_id = PurchaseOrderId::generate();
        let buyer = manager();
        let mut order = PurchaseOrder::empty(order_id.clone());
        run(&mut order, submit_cmd(business_id, &order_id, lines, false, &buyer)).unwrap();
        run(&mut order, transition_cmd(business_id, &order_id, PoStatus::Shipped, &buyer, None)).unwrap();
        (business_id, order, buyer)
    }

    #[test]
    fn submit_without_approval_lands_in_ordered() {
        let business_id = BusinessId::new();
        let order_id = PurchaseOrderId::new(AggregateId::from("PO-1"));
        let mut order = PurchaseOrder::empty(order_id.clone());

        let applied = run(&mut order, submit_cmd(business_id, &order_id, vec![milk(10, 1000)], false, &staff())).unwrap();

        assert_eq!(applied, 2);
        assert_eq!(order.status(), PoStatus::Ordered);
        assert_eq!(order.total_estimated(), d(10_000));
        assert!(order.order_date().is_some());
        let actions: Vec<_> = order.history().entries().iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![HistoryAction::Created, HistoryAction::Sent]);
    }

    #[test]
    fn submit_requiring_approval_is_parked() {
        let business_id = BusinessId::new();
        let order_id = PurchaseOrderId::generate();
        let mut order = PurchaseOrder::empty(order_id.clone());

        run(&mut order, submit_cmd(business_id, &order_id, vec![milk(10, 1000)], true, &staff())).unwrap();

        assert_eq!(order.status(), PoStatus::PendingApproval);
        assert_eq!(
            order.history().last().map(|e| e.note.as_str()),
            Some("submitted for approval")
        );
    }

    #[test]
    fn empty_order_cannot_be_submitted() {
        let order_id = PurchaseOrderId::generate();
        let order = PurchaseOrder::empty(order_id.clone());
        let err = order
            .handle(&submit_cmd(BusinessId::new(), &order_id, vec![], false, &staff()))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("at least one item")));
    }

    #[test]
    fn saved_draft_can_be_submitted_or_cancelled() {
        let business_id = BusinessId::new();
        let order_id = PurchaseOrderId::generate();
        let buyer = staff();
        let draft = |order_id: &PurchaseOrderId| {
            PurchaseOrderCommand::SaveDraft(SaveDraft {
                business_id,
                outlet_id: OutletId::new(),
                order_id: order_id.clone(),
                supplier: supplier(),
                lines: vec![milk(2, 500)],
                actor: buyer.clone(),
                note: Some("weekly".to_string()),
                occurred_at: Utc::now(),
            })
        };

        let mut order = PurchaseOrder::empty(order_id.clone());
        run(&mut order, draft(&order_id)).unwrap();
        assert_eq!(order.status(), PoStatus::Draft);
        assert_eq!(run(&mut order, submit_cmd(business_id, &order_id, vec![milk(3, 500)], false, &buyer)).unwrap(), 1);
        assert_eq!(order.status(), PoStatus::Ordered);
        assert_eq!(order.total_estimated(), d(1_500));

        let other_id = PurchaseOrderId::generate();
        let mut other = PurchaseOrder::empty(other_id.clone());
        run(&mut other, draft(&other_id)).unwrap();
        run(&mut other, transition_cmd(business_id, &other_id, PoStatus::Cancelled, &buyer, None)).unwrap();
        assert_eq!(other.status(), PoStatus::Cancelled);
        assert!(other.status().is_terminal());
    }

    #[test]
    fn draft_cannot_jump_to_shipped() {
        let business_id = BusinessId::new();
        let order_id = PurchaseOrderId::generate();
        let buyer = staff();
        let mut order = PurchaseOrder::empty(order_id.clone());
        run(
            &mut order,
            PurchaseOrderCommand::SaveDraft(SaveDraft {
                business_id,
                outlet_id: OutletId::new(),
                order_id: order_id.clone(),
                supplier: supplier(),
                lines: vec![milk(1, 10)],
                actor: buyer.clone(),
                note: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let err = order
            .handle(&transition_cmd(business_id, &order_id, PoStatus::Shipped, &buyer, None))
            .unwrap_err();
        assert_eq!(err, DomainError::invalid_transition("draft", "shipped"));
    }

    #[test]
    fn full_lifecycle_through_approval() {
        let business_id = BusinessId::new();
        let order_id = PurchaseOrderId::generate();
        let buyer = staff();
        let approver = manager();
        let mut order = PurchaseOrder::empty(order_id.clone());

        run(&mut order, submit_cmd(business_id, &order_id, vec![milk(10, 1000)], true, &buyer)).unwrap();
        run(&mut order, transition_cmd(business_id, &order_id, PoStatus::Ordered, &approver, None)).unwrap();
        run(&mut order, transition_cmd(business_id, &order_id, PoStatus::Shipped, &buyer, None)).unwrap();
        assert_eq!(order.status(), PoStatus::Shipped);

        let mut session = crate::receiving::ReceivingSession::start(&order).unwrap();
        session.confirm_physical_check().unwrap();
        session
            .select_settlement(&crate::receiving::SettlementSelection::cash())
            .unwrap();
        let outcome = session.complete(Utc::now(), None).unwrap();
        run(
            &mut order,
            PurchaseOrderCommand::ReceiveGoods(ReceiveGoods {
                business_id,
                order_id: order_id.clone(),
                outcome,
                actor: buyer.clone(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert_eq!(order.status(), PoStatus::Received);
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
        assert_eq!(order.received_by(), Some("Budi"));
        assert_eq!(order.history().len(), 5);
        assert_eq!(order.history().last().map(|e| e.action), Some(HistoryAction::Received));
    }

    #[test]
    fn staff_cannot_approve_and_reject_needs_reason() {
        let business_id = BusinessId::new();
        let order_id = PurchaseOrderId::generate();
        let buyer = staff();
        let mut order = PurchaseOrder::empty(order_id.clone());
        run(&mut order, submit_cmd(business_id, &order_id, vec![milk(10, 1000)], true, &buyer)).unwrap();

        let err = order
            .handle(&transition_cmd(business_id, &order_id, PoStatus::Ordered, &buyer, None))
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));

        let approver = manager();
        let err = order
            .handle(&transition_cmd(business_id, &order_id, PoStatus::Cancelled, &approver, None))
            .unwrap_err();
        assert_eq!(err, DomainError::validation("rejection reason is required"));

        run(
            &mut order,
            transition_cmd(business_id, &order_id, PoStatus::Cancelled, &approver, Some("over budget")),
        )
        .unwrap();
        assert_eq!(order.status(), PoStatus::Cancelled);
        assert!(order.history().last().is_some_and(|e| e.note.contains("over budget")));
    }

    #[test]
    fn repeating_a_transition_is_idempotent_for_the_same_actor_only() {
        let business_id = BusinessId::new();
        let order_id = PurchaseOrderId::generate();
        let buyer = staff();
        let approver = manager();
        let mut order = PurchaseOrder::empty(order_id.clone());
        run(&mut order, submit_cmd(business_id, &order_id, vec![milk(10, 1000)], true, &buyer)).unwrap();
        run(&mut order, transition_cmd(business_id, &order_id, PoStatus::Ordered, &approver, None)).unwrap();
        let version = order.version();

        let again = transition_cmd(business_id, &order_id, PoStatus::Ordered, &approver, None);
        assert_eq!(run(&mut order, again).unwrap(), 0);
        assert_eq!(order.version(), version);

        let other = transition_cmd(business_id, &order_id, PoStatus::Ordered, &manager(), None);
        assert_eq!(
            order.handle(&other).unwrap_err(),
            DomainError::invalid_transition("ordered", "ordered")
        );
    }

    #[test]
    fn received_cannot_be_set_by_plain_transition() {
        let (business_id, order, buyer) = shipped_order(vec![milk(10, 1000)]);
        let err = order
            .handle(&transition_cmd(business_id, order.id_typed(), PoStatus::Received, &buyer, None))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn unknown_order_is_not_found() {
        let order_id = PurchaseOrderId::generate();
        let order = PurchaseOrder::empty(order_id.clone());
        let err = order
            .handle(&transition_cmd(BusinessId::new(), &order_id, PoStatus::Cancelled, &staff(), None))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn category_totals_group_lines() {
        let business_id = BusinessId::new();
        let order_id = PurchaseOrderId::generate();
        let mut order = PurchaseOrder::empty(order_id.clone());
        let lines = vec![
            milk(10, 1000),
            OrderLine::new("ING-CHEESE", "Cheese", "kg", d(2), d(5000), "Dairy"),
            OrderLine::new("ING-FLOUR", "Flour", "kg", d(5), d(200), "Dry"),
        ];
        run(&mut order, submit_cmd(business_id, &order_id, lines, false, &staff())).unwrap();

        assert_eq!(
            order.category_totals().unwrap(),
            vec![("Dairy".to_string(), d(20_000)), ("Dry".to_string(), d(1_000))]
        );
    }

    proptest! {
        #[test]
        fn submitted_total_matches_lines(
            raw in prop::collection::vec((1i64..10_000, 0i64..1_000_000, 0u32..3), 1..12)
        ) {
            let lines: Vec<OrderLine> = raw
                .iter()
                .enumerate()
                .map(|(i, (qty_cents, cost_cents, scale))| {
                    OrderLine::new(
                        format!("ING-{i}"),
                        format!("item {i}"),
                        "pcs",
                        Decimal::new(*qty_cents, *scale),
                        Decimal::new(*cost_cents, 2),
                        "General",
                    )
                })
                .collect();
            prop_assume!(line::lines_total(&lines).unwrap() > Decimal::ZERO);

            let business_id = BusinessId::new();
            let order_id = PurchaseOrderId::generate();
            let mut order = PurchaseOrder::empty(order_id.clone());
            run(&mut order, submit_cmd(business_id, &order_id, lines.clone(), false, &staff())).unwrap();

            let expected: Decimal = lines.iter().map(|l| l.quantity * l.cost).sum();
            prop_assert!(money::totals_match(order.total_estimated(), expected));
        }
    }
}

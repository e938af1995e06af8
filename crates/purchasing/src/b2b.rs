//! Seller-side mirror of a transmitted purchase order.
//!
//! A [`B2BRequest`] lives in the seller's business and is paired with the
//! buyer's [`PurchaseOrder`](crate::order::PurchaseOrder) only through
//! `original_po_id`. Each side moves through its own status graph.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procureflow_core::{
    Aggregate, AggregateId, AggregateRoot, Amount, BusinessId, DomainError, DomainResult,
    OutletId, Quantity, UserId,
};
use procureflow_events::Event;

use crate::approval::Actor;
use crate::counterparty::BusinessRef;
use crate::line::OrderLine;
use crate::order::PurchaseOrderId;
use crate::receiving::PaymentStatus;

/// Seller-side identifier, derived from the buyer's PO id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct B2BRequestId(pub AggregateId);

impl B2BRequestId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// Exactly one mirror exists per PO, so the id is a function of it.
    pub fn for_order(order_id: &PurchaseOrderId) -> Self {
        Self(AggregateId::from(format!("B2B-{order_id}").as_str()))
    }
}

impl core::fmt::Display for B2BRequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Seller-side status. `accepted` is accepted on the wire as `processed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SellerStatus {
    Pending,
    #[serde(alias = "accepted")]
    Processed,
    Shipped,
    Completed,
    Rejected,
}

impl SellerStatus {
    pub fn successors(self) -> &'static [SellerStatus] {
        use SellerStatus::*;
        match self {
            Pending => &[Processed, Rejected],
            Processed => &[Shipped],
            Shipped => &[Completed],
            Completed | Rejected => &[],
        }
    }

    pub fn can_transition_to(self, target: SellerStatus) -> bool {
        self.successors().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SellerStatus::Pending => "pending",
            SellerStatus::Processed => "processed",
            SellerStatus::Shipped => "shipped",
            SellerStatus::Completed => "completed",
            SellerStatus::Rejected => "rejected",
        }
    }
}

impl core::fmt::Display for SellerStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierDetails {
    pub driver_name: String,
    pub plate_number: String,
    pub waybill_id: String,
    pub shipped_at: DateTime<Utc>,
}

/// Aggregate root: B2BRequest (seller-owned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct B2BRequest {
    id: B2BRequestId,
    business_id: Option<BusinessId>,
    target_outlet_id: Option<OutletId>,
    source: Option<BusinessRef>,
    original_po_id: Option<PurchaseOrderId>,
    items: Vec<OrderLine>,
    total_amount: Amount,
    status: SellerStatus,
    payment_status: PaymentStatus,
    courier: Option<CourierDetails>,
    accepted_by: Option<String>,
    checked_by: Option<String>,
    shipped_by: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    note: Option<String>,
    status_actor: Option<UserId>,
    version: u64,
    created: bool,
}

impl B2BRequest {
    pub fn empty(id: B2BRequestId) -> Self {
        Self {
            id,
            business_id: None,
            target_outlet_id: None,
            source: None,
            original_po_id: None,
            items: Vec::new(),
            total_amount: Decimal::ZERO,
            status: SellerStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            courier: None,
            accepted_by: None,
            checked_by: None,
            shipped_by: None,
            timestamp: None,
            note: None,
            status_actor: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> &B2BRequestId {
        &self.id
    }

    /// Seller business owning the request.
    pub fn business_id(&self) -> Option<BusinessId> {
        self.business_id
    }

    pub fn target_outlet_id(&self) -> Option<OutletId> {
        self.target_outlet_id
    }

    pub fn source(&self) -> Option<&BusinessRef> {
        self.source.as_ref()
    }

    pub fn original_po_id(&self) -> Option<&PurchaseOrderId> {
        self.original_po_id.as_ref()
    }

    pub fn items(&self) -> &[OrderLine] {
        &self.items
    }

    pub fn total_amount(&self) -> Amount {
        self.total_amount
    }

    pub fn status(&self) -> SellerStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn courier(&self) -> Option<&CourierDetails> {
        self.courier.as_ref()
    }

    pub fn accepted_by(&self) -> Option<&str> {
        self.accepted_by.as_deref()
    }

    pub fn checked_by(&self) -> Option<&str> {
        self.checked_by.as_deref()
    }

    pub fn shipped_by(&self) -> Option<&str> {
        self.shipped_by.as_deref()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Wire representation exchanged with the seller's tooling.
    pub fn to_wire(&self) -> DomainResult<B2BRequestRecord> {
        let (Some(source), Some(original_po_id), Some(target_outlet_id), Some(timestamp)) = (
            self.source.as_ref(),
            self.original_po_id.as_ref(),
            self.target_outlet_id,
            self.timestamp,
        ) else {
            return Err(DomainError::not_found());
        };

        Ok(B2BRequestRecord {
            id: self.id.to_string(),
            kind: RecordKind::PurchaseOrder,
            source_business_id: source.business_id.to_string(),
            source_outlet_id: source.outlet_id.to_string(),
            source_name: source.name.clone(),
            target_business_id: self.business_id.map(|b| b.to_string()),
            target_outlet_id: target_outlet_id.to_string(),
            original_po_id: original_po_id.to_string(),
            items: self.items.iter().map(WireItem::from).collect(),
            total_amount: self.total_amount,
            status: self.status,
            payment_status: self.payment_status,
            courier_details: self.courier.clone(),
            accepted_by: self.accepted_by.clone(),
            checked_by: self.checked_by.clone(),
            shipped_by: self.shipped_by.clone(),
            timestamp,
            note: self.note.clone(),
        })
    }
}

impl AggregateRoot for B2BRequest {
    type Id = B2BRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ReceiveRequest (transmission into the seller's inbox).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveRequest {
    pub business_id: BusinessId,
    pub request_id: B2BRequestId,
    pub target_outlet_id: OutletId,
    pub source: BusinessRef,
    pub original_po_id: PurchaseOrderId,
    pub items: Vec<OrderLine>,
    pub total_amount: Amount,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ProcessRequest (seller accepts and checks the order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub business_id: BusinessId,
    pub request_id: B2BRequestId,
    pub actor: Actor,
    /// Who checked the goods, if not the accepting user.
    pub checked_by: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ShipRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipRequest {
    pub business_id: BusinessId,
    pub request_id: B2BRequestId,
    pub actor: Actor,
    pub courier: Option<CourierDetails>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteRequest {
    pub business_id: BusinessId,
    pub request_id: B2BRequestId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectRequest {
    pub business_id: BusinessId,
    pub request_id: B2BRequestId,
    pub actor: Actor,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum B2BRequestCommand {
    ReceiveRequest(ReceiveRequest),
    ProcessRequest(ProcessRequest),
    ShipRequest(ShipRequest),
    CompleteRequest(CompleteRequest),
    RejectRequest(RejectRequest),
}

/// Event: RequestReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestReceived {
    pub business_id: BusinessId,
    pub request_id: B2BRequestId,
    pub target_outlet_id: OutletId,
    pub source: BusinessRef,
    pub original_po_id: PurchaseOrderId,
    pub items: Vec<OrderLine>,
    pub total_amount: Amount,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestProcessed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestProcessed {
    pub business_id: BusinessId,
    pub request_id: B2BRequestId,
    pub original_po_id: PurchaseOrderId,
    pub actor: Actor,
    pub checked_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestShipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestShipped {
    pub business_id: BusinessId,
    pub request_id: B2BRequestId,
    pub original_po_id: PurchaseOrderId,
    pub actor: Actor,
    pub courier: Option<CourierDetails>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCompleted {
    pub business_id: BusinessId,
    pub request_id: B2BRequestId,
    pub original_po_id: PurchaseOrderId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRejected {
    pub business_id: BusinessId,
    pub request_id: B2BRequestId,
    pub original_po_id: PurchaseOrderId,
    pub actor: Actor,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum B2BRequestEvent {
    RequestReceived(RequestReceived),
    RequestProcessed(RequestProcessed),
    RequestShipped(RequestShipped),
    RequestCompleted(RequestCompleted),
    RequestRejected(RequestRejected),
}

impl B2BRequestEvent {
    pub fn request_id(&self) -> &B2BRequestId {
        match self {
            B2BRequestEvent::RequestReceived(e) => &e.request_id,
            B2BRequestEvent::RequestProcessed(e) => &e.request_id,
            B2BRequestEvent::RequestShipped(e) => &e.request_id,
            B2BRequestEvent::RequestCompleted(e) => &e.request_id,
            B2BRequestEvent::RequestRejected(e) => &e.request_id,
        }
    }

    pub fn original_po_id(&self) -> &PurchaseOrderId {
        match self {
            B2BRequestEvent::RequestReceived(e) => &e.original_po_id,
            B2BRequestEvent::RequestProcessed(e) => &e.original_po_id,
            B2BRequestEvent::RequestShipped(e) => &e.original_po_id,
            B2BRequestEvent::RequestCompleted(e) => &e.original_po_id,
            B2BRequestEvent::RequestRejected(e) => &e.original_po_id,
        }
    }

    pub fn resulting_status(&self) -> SellerStatus {
        match self {
            B2BRequestEvent::RequestReceived(_) => SellerStatus::Pending,
            B2BRequestEvent::RequestProcessed(_) => SellerStatus::Processed,
            B2BRequestEvent::RequestShipped(_) => SellerStatus::Shipped,
            B2BRequestEvent::RequestCompleted(_) => SellerStatus::Completed,
            B2BRequestEvent::RequestRejected(_) => SellerStatus::Rejected,
        }
    }
}

impl Event for B2BRequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            B2BRequestEvent::RequestReceived(_) => "purchasing.b2b_request.received",
            B2BRequestEvent::RequestProcessed(_) => "purchasing.b2b_request.processed",
            B2BRequestEvent::RequestShipped(_) => "purchasing.b2b_request.shipped",
            B2BRequestEvent::RequestCompleted(_) => "purchasing.b2b_request.completed",
            B2BRequestEvent::RequestRejected(_) => "purchasing.b2b_request.rejected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            B2BRequestEvent::RequestReceived(e) => e.occurred_at,
            B2BRequestEvent::RequestProcessed(e) => e.occurred_at,
            B2BRequestEvent::RequestShipped(e) => e.occurred_at,
            B2BRequestEvent::RequestCompleted(e) => e.occurred_at,
            B2BRequestEvent::RequestRejected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for B2BRequest {
    type Command = B2BRequestCommand;
    type Event = B2BRequestEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            B2BRequestEvent::RequestReceived(e) => {
                self.id = e.request_id.clone();
                self.business_id = Some(e.business_id);
                self.target_outlet_id = Some(e.target_outlet_id);
                self.source = Some(e.source.clone());
                self.original_po_id = Some(e.original_po_id.clone());
                self.items = e.items.clone();
                self.total_amount = e.total_amount;
                self.status = SellerStatus::Pending;
                self.payment_status = PaymentStatus::Unpaid;
                self.timestamp = Some(e.occurred_at);
                self.note = e.note.clone();
                self.created = true;
            }
            B2BRequestEvent::RequestProcessed(e) => {
                self.status = SellerStatus::Processed;
                self.accepted_by = Some(e.actor.name.clone());
                self.checked_by = Some(e.checked_by.clone());
                self.status_actor = Some(e.actor.user_id);
            }
            B2BRequestEvent::RequestShipped(e) => {
                self.status = SellerStatus::Shipped;
                self.shipped_by = Some(e.actor.name.clone());
                self.courier = e.courier.clone();
                self.status_actor = Some(e.actor.user_id);
            }
            B2BRequestEvent::RequestCompleted(e) => {
                self.status = SellerStatus::Completed;
                self.status_actor = Some(e.actor.user_id);
            }
            B2BRequestEvent::RequestRejected(e) => {
                self.status = SellerStatus::Rejected;
                if e.reason.is_some() {
                    self.note = e.reason.clone();
                }
                self.status_actor = Some(e.actor.user_id);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            B2BRequestCommand::ReceiveRequest(cmd) => self.handle_receive(cmd),
            B2BRequestCommand::ProcessRequest(cmd) => {
                self.ensure_existing(cmd.business_id, &cmd.request_id)?;
                if self.check_target(SellerStatus::Processed, &cmd.actor)? {
                    return Ok(vec![]);
                }
                Ok(vec![B2BRequestEvent::RequestProcessed(RequestProcessed {
                    business_id: cmd.business_id,
                    request_id: cmd.request_id.clone(),
                    original_po_id: self.original_po()?,
                    actor: cmd.actor.clone(),
                    checked_by: cmd
                        .checked_by
                        .clone()
                        .unwrap_or_else(|| cmd.actor.name.clone()),
                    occurred_at: cmd.occurred_at,
                })])
            }
            B2BRequestCommand::ShipRequest(cmd) => {
                self.ensure_existing(cmd.business_id, &cmd.request_id)?;
                if self.check_target(SellerStatus::Shipped, &cmd.actor)? {
                    return Ok(vec![]);
                }
                Ok(vec![B2BRequestEvent::RequestShipped(RequestShipped {
                    business_id: cmd.business_id,
                    request_id: cmd.request_id.clone(),
                    original_po_id: self.original_po()?,
                    actor: cmd.actor.clone(),
                    courier: cmd.courier.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            B2BRequestCommand::CompleteRequest(cmd) => {
                self.ensure_existing(cmd.business_id, &cmd.request_id)?;
                if self.check_target(SellerStatus::Completed, &cmd.actor)? {
                    return Ok(vec![]);
                }
                Ok(vec![B2BRequestEvent::RequestCompleted(RequestCompleted {
                    business_id: cmd.business_id,
                    request_id: cmd.request_id.clone(),
                    original_po_id: self.original_po()?,
                    actor: cmd.actor.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            B2BRequestCommand::RejectRequest(cmd) => {
                self.ensure_existing(cmd.business_id, &cmd.request_id)?;
                if self.check_target(SellerStatus::Rejected, &cmd.actor)? {
                    return Ok(vec![]);
                }
                Ok(vec![B2BRequestEvent::RequestRejected(RequestRejected {
                    business_id: cmd.business_id,
                    request_id: cmd.request_id.clone(),
                    original_po_id: self.original_po()?,
                    actor: cmd.actor.clone(),
                    reason: cmd.reason.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl B2BRequest {
    fn ensure_existing(&self, business_id: BusinessId, request_id: &B2BRequestId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.business_id != Some(business_id) {
            return Err(DomainError::invariant("business mismatch"));
        }
        if &self.id != request_id {
            return Err(DomainError::invariant("request_id mismatch"));
        }
        Ok(())
    }

    fn original_po(&self) -> Result<PurchaseOrderId, DomainError> {
        self.original_po_id
            .clone()
            .ok_or_else(|| DomainError::invariant("request has no original purchase order"))
    }

    /// `Ok(true)` for a same-actor repeat (no-op), `Ok(false)` for a valid
    /// step, otherwise `InvalidTransition`.
    fn check_target(&self, target: SellerStatus, actor: &Actor) -> Result<bool, DomainError> {
        if self.status == target {
            if self.status_actor == Some(actor.user_id) {
                return Ok(true);
            }
            return Err(DomainError::invalid_transition(self.status, target));
        }
        if !self.status.can_transition_to(target) {
            return Err(DomainError::invalid_transition(self.status, target));
        }
        Ok(false)
    }

    fn handle_receive(&self, cmd: &ReceiveRequest) -> Result<Vec<B2BRequestEvent>, DomainError> {
        if self.created {
            // Retransmission of the same PO is a no-op.
            if self.original_po_id.as_ref() == Some(&cmd.original_po_id) {
                return Ok(vec![]);
            }
            return Err(DomainError::conflict(format!(
                "request {} already mirrors another purchase order",
                cmd.request_id
            )));
        }
        if cmd.source.business_id == cmd.business_id {
            return Err(DomainError::validation(
                "a business cannot send a purchase order to itself",
            ));
        }
        if cmd.items.is_empty() {
            return Err(DomainError::validation("request must contain at least one item"));
        }

        Ok(vec![B2BRequestEvent::RequestReceived(RequestReceived {
            business_id: cmd.business_id,
            request_id: cmd.request_id.clone(),
            target_outlet_id: cmd.target_outlet_id,
            source: cmd.source.clone(),
            original_po_id: cmd.original_po_id.clone(),
            items: cmd.items.clone(),
            total_amount: cmd.total_amount,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

/// The `type` discriminator of the wire record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    #[serde(rename = "purchase_order")]
    PurchaseOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireItem {
    pub ingredient_id: String,
    pub name: String,
    pub unit: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Quantity,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Amount,
}

impl From<&OrderLine> for WireItem {
    fn from(line: &OrderLine) -> Self {
        Self {
            ingredient_id: line.item_id.clone(),
            name: line.name.clone(),
            unit: line.unit.clone(),
            quantity: line.quantity,
            cost: line.cost,
        }
    }
}

/// B2B request as exchanged on the wire (camelCase JSON, numbers as floats).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct B2BRequestRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub source_business_id: String,
    pub source_outlet_id: String,
    pub source_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_business_id: Option<String>,
    pub target_outlet_id: String,
    pub original_po_id: String,
    pub items: Vec<WireItem>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Amount,
    pub status: SellerStatus,
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courier_details: Option<CourierDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipped_by: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl B2BRequestRecord {
    pub fn to_json(&self) -> DomainResult<String> {
        serde_json::to_string(self).map_err(|e| DomainError::validation(e.to_string()))
    }

    pub fn from_json(json: &str) -> DomainResult<Self> {
        let record: Self =
            serde_json::from_str(json).map_err(|e| DomainError::validation(e.to_string()))?;
        if record.id.trim().is_empty() || record.original_po_id.trim().is_empty() {
            return Err(DomainError::validation(
                "b2b request record requires id and originalPoId",
            ));
        }
        if record.id == record.original_po_id {
            return Err(DomainError::validation(
                "b2b request id must differ from originalPoId",
            ));
        }
        Ok(record)
    }
}

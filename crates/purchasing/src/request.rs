//! Purchase requests: staff asks that are reviewed before becoming orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procureflow_core::{
    Aggregate, AggregateId, AggregateRoot, Amount, BusinessId, DomainError, DomainResult,
};
use procureflow_events::Event;

use crate::approval::Actor;
use crate::cart::{Cart, CartLine};
use crate::history::{HistoryAction, HistoryLog};
use crate::order::PurchaseOrderId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseRequestId(pub AggregateId);

impl PurchaseRequestId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::generate("PR"))
    }
}

impl core::fmt::Display for PurchaseRequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Open,
    Converted,
    Dismissed,
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            RequestStatus::Open => "open",
            RequestStatus::Converted => "converted",
            RequestStatus::Dismissed => "dismissed",
        };
        f.write_str(s)
    }
}

/// Aggregate root: PurchaseRequest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    id: PurchaseRequestId,
    business_id: Option<BusinessId>,
    lines: Vec<CartLine>,
    requested_by: Option<Actor>,
    status: RequestStatus,
    note: Option<String>,
    converted_to: Vec<PurchaseOrderId>,
    history: HistoryLog,
    version: u64,
    created: bool,
}

impl PurchaseRequest {
    pub fn empty(id: PurchaseRequestId) -> Self {
        Self {
            id,
            business_id: None,
            lines: Vec::new(),
            requested_by: None,
            status: RequestStatus::Open,
            note: None,
            converted_to: Vec::new(),
            history: HistoryLog::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> &PurchaseRequestId {
        &self.id
    }

    pub fn business_id(&self) -> Option<BusinessId> {
        self.business_id
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn requested_by(&self) -> Option<&Actor> {
        self.requested_by.as_ref()
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Orders created from this request, one per supplier.
    pub fn converted_to(&self) -> &[PurchaseOrderId] {
        &self.converted_to
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn total(&self) -> DomainResult<Amount> {
        crate::line::lines_total(self.lines.iter().map(|l| &l.line))
    }

    /// The request's lines as a fresh cart, for editing before submission.
    pub fn to_cart(&self) -> Cart {
        let mut cart = Cart::new();
        for CartLine { supplier, line } in &self.lines {
            // Lines were validated when the request was submitted.
            let _ = cart.add(supplier.clone(), line.clone());
        }
        cart
    }
}

impl AggregateRoot for PurchaseRequest {
    type Id = PurchaseRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub business_id: BusinessId,
    pub request_id: PurchaseRequestId,
    pub lines: Vec<CartLine>,
    pub actor: Actor,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertRequest {
    pub business_id: BusinessId,
    pub request_id: PurchaseRequestId,
    pub order_ids: Vec<PurchaseOrderId>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DismissRequest {
    pub business_id: BusinessId,
    pub request_id: PurchaseRequestId,
    pub actor: Actor,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseRequestCommand {
    SubmitRequest(SubmitRequest),
    ConvertRequest(ConvertRequest),
    DismissRequest(DismissRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSubmitted {
    pub business_id: BusinessId,
    pub request_id: PurchaseRequestId,
    pub lines: Vec<CartLine>,
    pub actor: Actor,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestConverted {
    pub business_id: BusinessId,
    pub request_id: PurchaseRequestId,
    pub order_ids: Vec<PurchaseOrderId>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDismissed {
    pub business_id: BusinessId,
    pub request_id: PurchaseRequestId,
    pub actor: Actor,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseRequestEvent {
    RequestSubmitted(RequestSubmitted),
    RequestConverted(RequestConverted),
    RequestDismissed(RequestDismissed),
}

impl Event for PurchaseRequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseRequestEvent::RequestSubmitted(_) => "purchasing.request.submitted",
            PurchaseRequestEvent::RequestConverted(_) => "purchasing.request.converted",
            PurchaseRequestEvent::RequestDismissed(_) => "purchasing.request.dismissed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseRequestEvent::RequestSubmitted(e) => e.occurred_at,
            PurchaseRequestEvent::RequestConverted(e) => e.occurred_at,
            PurchaseRequestEvent::RequestDismissed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseRequest {
    type Command = PurchaseRequestCommand;
    type Event = PurchaseRequestEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseRequestEvent::RequestSubmitted(e) => {
                self.id = e.request_id.clone();
                self.business_id = Some(e.business_id);
                self.lines = e.lines.clone();
                self.requested_by = Some(e.actor.clone());
                self.status = RequestStatus::Open;
                self.note = e.note.clone();
                self.history.append(
                    e.occurred_at,
                    HistoryAction::Created,
                    e.actor.name.clone(),
                    "purchase request submitted",
                );
                self.created = true;
            }
            PurchaseRequestEvent::RequestConverted(e) => {
                self.status = RequestStatus::Converted;
                self.converted_to = e.order_ids.clone();
                let ids: Vec<String> = e.order_ids.iter().map(ToString::to_string).collect();
                self.history.append(
                    e.occurred_at,
                    HistoryAction::Updated,
                    e.actor.name.clone(),
                    format!("converted to {}", ids.join(", ")),
                );
            }
            PurchaseRequestEvent::RequestDismissed(e) => {
                self.status = RequestStatus::Dismissed;
                self.history.append(
                    e.occurred_at,
                    HistoryAction::Updated,
                    e.actor.name.clone(),
                    e.reason.clone().unwrap_or_else(|| "dismissed".to_string()),
                );
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseRequestCommand::SubmitRequest(cmd) => {
                if self.created {
                    return Err(DomainError::conflict(format!(
                        "purchase request {} already exists",
                        cmd.request_id
                    )));
                }
                if cmd.lines.is_empty() {
                    return Err(DomainError::validation(
                        "request must contain at least one item",
                    ));
                }
                for CartLine { line, .. } in &cmd.lines {
                    line.validate()?;
                }
                Ok(vec![PurchaseRequestEvent::RequestSubmitted(RequestSubmitted {
                    business_id: cmd.business_id,
                    request_id: cmd.request_id.clone(),
                    lines: cmd.lines.clone(),
                    actor: cmd.actor.clone(),
                    note: cmd.note.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            PurchaseRequestCommand::ConvertRequest(cmd) => {
                self.ensure_open(cmd.business_id, RequestStatus::Converted)?;
                if cmd.order_ids.is_empty() {
                    return Err(DomainError::validation(
                        "conversion must name at least one order",
                    ));
                }
                Ok(vec![PurchaseRequestEvent::RequestConverted(RequestConverted {
                    business_id: cmd.business_id,
                    request_id: cmd.request_id.clone(),
                    order_ids: cmd.order_ids.clone(),
                    actor: cmd.actor.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            PurchaseRequestCommand::DismissRequest(cmd) => {
                self.ensure_open(cmd.business_id, RequestStatus::Dismissed)?;
                Ok(vec![PurchaseRequestEvent::RequestDismissed(RequestDismissed {
                    business_id: cmd.business_id,
                    request_id: cmd.request_id.clone(),
                    actor: cmd.actor.clone(),
                    reason: cmd.reason.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl PurchaseRequest {
    fn ensure_open(&self, business_id: BusinessId, target: RequestStatus) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.business_id != Some(business_id) {
            return Err(DomainError::invariant("business mismatch"));
        }
        if self.status != RequestStatus::Open {
            return Err(DomainError::invalid_transition(self.status, target));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::Role;
    use crate::counterparty::SupplierRef;
    use crate::line::OrderLine;
    use procureflow_core::UserId;
    use procureflow_partners::{PartnerId, PerformanceScore};
    use rust_decimal::Decimal;

    fn cart_line(supplier: &str, item: &str) -> CartLine {
        CartLine {
            supplier: SupplierRef {
                partner_id: PartnerId::new(AggregateId::from(supplier)),
                name: supplier.to_string(),
                linked: None,
                network_verified: false,
                score: PerformanceScore::default(),
            },
            line: OrderLine::new(item, item, "kg", Decimal::new(2, 0), Decimal::new(100, 0), "Dry"),
        }
    }

    fn submitted(business_id: BusinessId) -> PurchaseRequest {
        let request_id = PurchaseRequestId::generate();
        let mut request = PurchaseRequest::empty(request_id.clone());
        let cmd = PurchaseRequestCommand::SubmitRequest(SubmitRequest {
            business_id,
            request_id,
            lines: vec![cart_line("SUP-A", "ING-1"), cart_line("SUP-B", "ING-2")],
            actor: Actor::new(UserId::new(), "Budi", Role::Staff),
            note: Some("running low".to_string()),
            occurred_at: Utc::now(),
        });
        for ev in request.handle(&cmd).unwrap() {
            request.apply(&ev);
        }
        request
    }

    #[test]
    fn submitted_request_is_open_and_converts_to_cart() {
        let request = submitted(BusinessId::new());
        assert_eq!(request.status(), RequestStatus::Open);
        assert_eq!(request.total().unwrap(), Decimal::new(400, 0));

        let cart = request.to_cart();
        assert_eq!(cart.split_by_supplier(crate::approval::OrderMode::Po).len(), 2);
    }

    #[test]
    fn converted_request_cannot_be_dismissed() {
        let business_id = BusinessId::new();
        let mut request = submitted(business_id);
        let manager = Actor::new(UserId::new(), "Sari", Role::Manager);

        let convert = PurchaseRequestCommand::ConvertRequest(ConvertRequest {
            business_id,
            request_id: request.id_typed().clone(),
            order_ids: vec![PurchaseOrderId::generate()],
            actor: manager.clone(),
            occurred_at: Utc::now(),
        });
        for ev in request.handle(&convert).unwrap() {
            request.apply(&ev);
        }
        assert_eq!(request.status(), RequestStatus::Converted);
        assert_eq!(request.converted_to().len(), 1);

        let dismiss = PurchaseRequestCommand::DismissRequest(DismissRequest {
            business_id,
            request_id: request.id_typed().clone(),
            actor: manager,
            reason: None,
            occurred_at: Utc::now(),
        });
        assert_eq!(
            request.handle(&dismiss).unwrap_err(),
            DomainError::invalid_transition("converted", "dismissed")
        );
    }
}

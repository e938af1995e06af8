//! Receiving reconciliation: physical check, billing, settlement.
//!
//! A [`ReceivingSession`] is opened on a shipped order and walked through
//! three steps. Completing it yields a [`ReceivingOutcome`] that the order
//! aggregate records and the caller books into stock and the journal.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procureflow_core::{AggregateId, Amount, DomainError, DomainResult, Quantity, money};

use crate::line::OrderLine;
use crate::order::{PoStatus, PurchaseOrder};

/// Why the received quantity differs from the ordered one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscrepancyReason {
    /// More arrived than ordered; the surplus is free.
    Bonus,
    Damaged,
    Missing,
}

impl core::fmt::Display for DiscrepancyReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            DiscrepancyReason::Bonus => "bonus",
            DiscrepancyReason::Damaged => "damaged",
            DiscrepancyReason::Missing => "missing",
        };
        f.write_str(s)
    }
}

/// Quantity the buyer pays for.
///
/// Bonus surplus is free, damaged or missing units are not charged.
pub fn billable_quantity(
    ordered: Quantity,
    received: Quantity,
    reason: Option<DiscrepancyReason>,
) -> Quantity {
    match reason {
        Some(DiscrepancyReason::Bonus) => ordered,
        Some(DiscrepancyReason::Damaged) | Some(DiscrepancyReason::Missing) | None => received,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    /// Trade credit, paid by a due date.
    Tempo,
}

impl core::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Tempo => "tempo",
        };
        f.write_str(s)
    }
}

/// Settlement as chosen in the form; required fields may still be missing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementSelection {
    pub method: Option<PaymentMethod>,
    pub term_days: Option<u32>,
    pub source_account: Option<String>,
}

impl SettlementSelection {
    pub fn cash() -> Self {
        Self {
            method: Some(PaymentMethod::Cash),
            ..Self::default()
        }
    }

    pub fn transfer(source_account: impl Into<String>) -> Self {
        Self {
            method: Some(PaymentMethod::Transfer),
            source_account: Some(source_account.into()),
            ..Self::default()
        }
    }

    pub fn tempo(term_days: u32) -> Self {
        Self {
            method: Some(PaymentMethod::Tempo),
            term_days: Some(term_days),
            ..Self::default()
        }
    }
}

/// A complete, validated settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum Settlement {
    Cash,
    Transfer { source_account: String },
    Tempo { term_days: u32 },
}

impl Settlement {
    pub fn from_selection(selection: &SettlementSelection) -> DomainResult<Self> {
        match selection.method {
            None => Err(DomainError::incomplete_receiving(
                "payment method must be selected",
            )),
            Some(PaymentMethod::Cash) => Ok(Settlement::Cash),
            Some(PaymentMethod::Transfer) => match selection.source_account.as_deref().map(str::trim) {
                Some(account) if !account.is_empty() => Ok(Settlement::Transfer {
                    source_account: account.to_string(),
                }),
                _ => Err(DomainError::incomplete_receiving(
                    "transfer settlement requires a source account",
                )),
            },
            Some(PaymentMethod::Tempo) => match selection.term_days {
                Some(term_days) => Ok(Settlement::Tempo { term_days }),
                None => Err(DomainError::incomplete_receiving(
                    "tempo settlement requires termDays",
                )),
            },
        }
    }

    pub fn method(&self) -> PaymentMethod {
        match self {
            Settlement::Cash => PaymentMethod::Cash,
            Settlement::Transfer { .. } => PaymentMethod::Transfer,
            Settlement::Tempo { .. } => PaymentMethod::Tempo,
        }
    }

    pub fn payment_status(&self) -> PaymentStatus {
        match self {
            Settlement::Tempo { .. } => PaymentStatus::Unpaid,
            Settlement::Cash | Settlement::Transfer { .. } => PaymentStatus::Paid,
        }
    }

    /// `submitted_at + term_days` for tempo; nothing is due otherwise.
    pub fn due_date(&self, submitted_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Settlement::Tempo { term_days } => {
                Some(submitted_at + Duration::days(i64::from(*term_days)))
            }
            Settlement::Cash | Settlement::Transfer { .. } => None,
        }
    }
}

/// Where a session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceivingStep {
    PhysicalCheck,
    Billing,
    Settlement,
}

/// One reconciled line with what it costs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BilledLine {
    pub line: OrderLine,
    pub billable_quantity: Quantity,
    pub billed_amount: Amount,
}

/// Result of a completed receiving session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingOutcome {
    pub order_id: AggregateId,
    pub lines: Vec<BilledLine>,
    pub total_bill: Amount,
    pub settlement: Settlement,
    pub payment_status: PaymentStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl ReceivingOutcome {
    /// Lines as they are recorded on the order.
    pub fn received_lines(&self) -> Vec<OrderLine> {
        self.lines.iter().map(|b| b.line.clone()).collect()
    }
}

/// Stateful, per-order reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivingSession {
    order_id: AggregateId,
    lines: Vec<OrderLine>,
    step: ReceivingStep,
    settlement: Option<Settlement>,
}

impl ReceivingSession {
    /// Open a session on a shipped order. Every line starts as fully received.
    pub fn start(order: &PurchaseOrder) -> DomainResult<Self> {
        if order.status() != PoStatus::Shipped {
            return Err(DomainError::validation(format!(
                "only shipped orders can be received (order {} is {})",
                order.id_typed(),
                order.status()
            )));
        }

        let lines = order
            .lines()
            .iter()
            .cloned()
            .map(|mut line| {
                line.received_quantity = Some(line.quantity);
                line.discrepancy_reason = None;
                line
            })
            .collect();

        Ok(Self {
            order_id: order.id_typed().0.clone(),
            lines,
            step: ReceivingStep::PhysicalCheck,
            settlement: None,
        })
    }

    pub fn order_id(&self) -> &AggregateId {
        &self.order_id
    }

    pub fn step(&self) -> ReceivingStep {
        self.step
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Step 1: capture what physically arrived for one item.
    ///
    /// Going back to the physical check discards a chosen settlement.
    pub fn record(
        &mut self,
        item_id: &str,
        received_quantity: Quantity,
        reason: Option<DiscrepancyReason>,
    ) -> DomainResult<()> {
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.item_id == item_id)
            .ok_or_else(|| {
                DomainError::validation(format!("item {item_id} is not on order {}", self.order_id))
            })?;

        if received_quantity < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "received quantity for '{}' must not be negative",
                line.name
            )));
        }

        line.received_quantity = Some(received_quantity);
        // A reason only means something when the quantities differ.
        line.discrepancy_reason = if received_quantity == line.quantity {
            None
        } else {
            reason
        };

        self.step = ReceivingStep::PhysicalCheck;
        self.settlement = None;
        Ok(())
    }

    /// Advance from the physical check. Every discrepant line needs a reason
    /// that fits the direction of the difference.
    pub fn confirm_physical_check(&mut self) -> DomainResult<()> {
        for line in &self.lines {
            let received = line.received_quantity.unwrap_or(line.quantity);
            if received == line.quantity {
                continue;
            }
            match line.discrepancy_reason {
                None => {
                    return Err(DomainError::incomplete_receiving(format!(
                        "discrepancy reason required for '{}' (ordered {}, received {})",
                        line.name, line.quantity, received
                    )));
                }
                Some(DiscrepancyReason::Bonus) if received < line.quantity => {
                    return Err(DomainError::validation(format!(
                        "'{}' is short; bonus applies only when more was received",
                        line.name
                    )));
                }
                Some(reason @ (DiscrepancyReason::Damaged | DiscrepancyReason::Missing))
                    if received > line.quantity =>
                {
                    return Err(DomainError::validation(format!(
                        "'{}' is over-delivered; {reason} applies only when less was received",
                        line.name
                    )));
                }
                Some(_) => {}
            }
        }

        self.step = ReceivingStep::Billing;
        Ok(())
    }

    /// Step 2: billable quantity and amount per line.
    pub fn billing(&self) -> DomainResult<Vec<BilledLine>> {
        if self.step == ReceivingStep::PhysicalCheck {
            return Err(DomainError::incomplete_receiving(
                "physical check has not been confirmed",
            ));
        }

        self.lines
            .iter()
            .map(|line| -> DomainResult<BilledLine> {
                let received = line.received_quantity.unwrap_or(line.quantity);
                let billable = billable_quantity(line.quantity, received, line.discrepancy_reason);
                let billed_amount = money::line_amount(billable, line.cost).ok_or_else(|| {
                    DomainError::validation(format!("billed amount for '{}' is too large", line.name))
                })?;
                Ok(BilledLine {
                    line: line.clone(),
                    billable_quantity: billable,
                    billed_amount,
                })
            })
            .collect()
    }

    /// `Σ(billable_quantity * cost)`.
    pub fn total_bill(&self) -> DomainResult<Amount> {
        money::checked_sum(self.billing()?.iter().map(|b| b.billed_amount))
            .ok_or_else(|| DomainError::validation("bill total is too large"))
    }

    /// Step 3: choose how the supplier is paid.
    pub fn select_settlement(&mut self, selection: &SettlementSelection) -> DomainResult<()> {
        if self.step == ReceivingStep::PhysicalCheck {
            return Err(DomainError::incomplete_receiving(
                "physical check has not been confirmed",
            ));
        }
        self.settlement = Some(Settlement::from_selection(selection)?);
        self.step = ReceivingStep::Settlement;
        Ok(())
    }

    /// Finish the session. `submitted_at` anchors the tempo due date.
    pub fn complete(
        self,
        submitted_at: DateTime<Utc>,
        note: Option<String>,
    ) -> DomainResult<ReceivingOutcome> {
        let lines = self.billing()?;
        let Some(settlement) = self.settlement else {
            return Err(DomainError::incomplete_receiving(
                "payment method must be selected",
            ));
        };

        let total_bill = money::checked_sum(lines.iter().map(|b| b.billed_amount))
            .ok_or_else(|| DomainError::validation("bill total is too large"))?;
        Ok(ReceivingOutcome {
            order_id: self.order_id,
            lines,
            total_bill,
            payment_status: settlement.payment_status(),
            due_date: settlement.due_date(submitted_at),
            settlement,
            note,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::tests::{d, milk, shipped_order};
    use proptest::prelude::*;

    fn session_for(lines: Vec<OrderLine>) -> ReceivingSession {
        let (_, order, _) = shipped_order(lines);
        ReceivingSession::start(&order).unwrap()
    }

    fn bill_for(received: i64, reason: Option<DiscrepancyReason>) -> Amount {
        let mut session = session_for(vec![milk(10, 1000)]);
        session.record("ING-MILK", d(received), reason).unwrap();
        session.confirm_physical_check().unwrap();
        session.total_bill().unwrap()
    }

    #[test]
    fn bonus_surplus_is_free() {
        assert_eq!(bill_for(12, Some(DiscrepancyReason::Bonus)), d(10_000));
    }

    #[test]
    fn missing_units_are_not_billed() {
        assert_eq!(bill_for(8, Some(DiscrepancyReason::Missing)), d(8_000));
        assert_eq!(bill_for(7, Some(DiscrepancyReason::Damaged)), d(7_000));
    }

    #[test]
    fn exact_delivery_bills_the_order() {
        assert_eq!(bill_for(10, None), d(10_000));
    }

    #[test]
    fn discrepancy_without_reason_names_the_item() {
        let mut session = session_for(vec![milk(10, 1000)]);
        session.record("ING-MILK", d(8), None).unwrap();
        let err = session.confirm_physical_check().unwrap_err();
        assert!(matches!(err, DomainError::IncompleteReceiving(msg) if msg.contains("Fresh Milk")));
        assert_eq!(session.step(), ReceivingStep::PhysicalCheck);
    }

    #[test]
    fn reason_must_fit_the_direction() {
        let mut session = session_for(vec![milk(10, 1000)]);
        session
            .record("ING-MILK", d(8), Some(DiscrepancyReason::Bonus))
            .unwrap();
        assert!(matches!(
            session.confirm_physical_check(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn billing_requires_confirmed_physical_check() {
        let session = session_for(vec![milk(10, 1000)]);
        assert!(matches!(
            session.total_bill(),
            Err(DomainError::IncompleteReceiving(_))
        ));
    }

    #[test]
    fn tempo_needs_term_days_and_sets_due_date() {
        let mut session = session_for(vec![milk(10, 1000)]);
        session.confirm_physical_check().unwrap();

        let incomplete = SettlementSelection {
            method: Some(PaymentMethod::Tempo),
            ..SettlementSelection::default()
        };
        let err = session.select_settlement(&incomplete).unwrap_err();
        assert_eq!(
            err,
            DomainError::incomplete_receiving("tempo settlement requires termDays")
        );

        session.select_settlement(&SettlementSelection::tempo(30)).unwrap();
        let submitted_at = Utc::now();
        let outcome = session.complete(submitted_at, None).unwrap();
        assert_eq!(outcome.payment_status, PaymentStatus::Unpaid);
        assert_eq!(outcome.due_date, Some(submitted_at + Duration::days(30)));
    }

    #[test]
    fn transfer_needs_source_account() {
        let blank = SettlementSelection {
            method: Some(PaymentMethod::Transfer),
            source_account: Some("  ".to_string()),
            ..SettlementSelection::default()
        };
        assert!(matches!(
            Settlement::from_selection(&blank),
            Err(DomainError::IncompleteReceiving(msg)) if msg.contains("source account")
        ));
        assert_eq!(
            Settlement::from_selection(&SettlementSelection::transfer("BCA-001")).unwrap(),
            Settlement::Transfer {
                source_account: "BCA-001".to_string()
            }
        );
    }

    #[test]
    fn completion_without_settlement_is_incomplete() {
        let mut session = session_for(vec![milk(10, 1000)]);
        session.confirm_physical_check().unwrap();
        assert!(matches!(
            session.complete(Utc::now(), None),
            Err(DomainError::IncompleteReceiving(_))
        ));
    }

    #[test]
    fn re_recording_resets_to_physical_check() {
        let mut session = session_for(vec![milk(10, 1000)]);
        session.confirm_physical_check().unwrap();
        session.select_settlement(&SettlementSelection::cash()).unwrap();
        session.record("ING-MILK", d(10), None).unwrap();
        assert_eq!(session.step(), ReceivingStep::PhysicalCheck);
    }

    #[test]
    fn orders_not_shipped_cannot_be_received() {
        let order = crate::order::PurchaseOrder::empty(crate::order::PurchaseOrderId::generate());
        assert!(ReceivingSession::start(&order).is_err());
    }

    proptest! {
        #[test]
        fn billable_never_exceeds_ordered_or_received(
            ordered in 1i64..1_000,
            received in 0i64..2_000,
        ) {
            let (ordered, received) = (d(ordered), d(received));
            let reason = if received > ordered {
                Some(DiscrepancyReason::Bonus)
            } else if received < ordered {
                Some(DiscrepancyReason::Missing)
            } else {
                None
            };
            let billable = billable_quantity(ordered, received, reason);
            prop_assert!(billable <= ordered);
            prop_assert!(billable <= received.max(ordered));
            prop_assert_eq!(billable, ordered.min(received));
        }
    }
}

//! Draft & cart: composing orders from a multi-supplier catalog.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procureflow_budget::BudgetAssessment;
use procureflow_core::{Amount, DomainError, DomainResult, Quantity};
use procureflow_partners::{PartnerId, PerformanceScore};

use crate::approval::OrderMode;
use crate::counterparty::SupplierRef;
use crate::line::{self, OrderLine};
use crate::order::PurchaseOrderId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub supplier: SupplierRef,
    pub line: OrderLine,
}

/// Raised when a line comes from a supplier scoring below the risk threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAdvisory {
    pub partner_id: PartnerId,
    pub supplier_name: String,
    pub score: PerformanceScore,
}

/// Informational payload returned with reviews and submissions. Never blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    Budget(BudgetAssessment),
    Risk(RiskAdvisory),
}

/// Buyer's current stock of a cart item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalStock {
    pub item_id: String,
    pub name: String,
    pub on_hand: Quantity,
}

/// Everything shown to the buyer before submitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartReview {
    pub total: Amount,
    /// One entry per category the cart touches.
    pub budget: Vec<BudgetAssessment>,
    pub risks: Vec<RiskAdvisory>,
    pub local_stock: Vec<LocalStock>,
}

impl CartReview {
    /// Budget assessments that carry a level, followed by risk flags.
    pub fn advisories(&self) -> Vec<Advisory> {
        self.budget
            .iter()
            .filter(|a| a.level.is_some())
            .cloned()
            .map(Advisory::Budget)
            .chain(self.risks.iter().cloned().map(Advisory::Risk))
            .collect()
    }
}

/// An order ready to be submitted to one supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    /// Caller-chosen id; generated on submit when absent.
    pub order_id: Option<PurchaseOrderId>,
    pub supplier: SupplierRef,
    pub lines: Vec<OrderLine>,
    pub mode: OrderMode,
    pub declared_total: Option<Amount>,
    pub note: Option<String>,
}

impl OrderDraft {
    pub fn new(supplier: SupplierRef, lines: Vec<OrderLine>) -> Self {
        Self {
            order_id: None,
            supplier,
            lines,
            mode: OrderMode::Po,
            declared_total: None,
            note: None,
        }
    }

    pub fn with_order_id(mut self, order_id: PurchaseOrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn total(&self) -> DomainResult<Amount> {
        line::lines_total(&self.lines)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Add a line; the same item from the same supplier is merged and takes
    /// the latest cost.
    pub fn add(&mut self, supplier: SupplierRef, line: OrderLine) -> DomainResult<()> {
        line.validate()?;

        let existing = self.lines.iter_mut().find(|l| {
            l.supplier.partner_id == supplier.partner_id && l.line.item_id == line.item_id
        });
        match existing {
            Some(l) => {
                let mut merged = line;
                merged.quantity = l.line.quantity.checked_add(merged.quantity).ok_or_else(|| {
                    DomainError::validation(format!("quantity for '{}' is too large", merged.name))
                })?;
                merged.validate()?;
                l.line.quantity = merged.quantity;
                l.line.cost = merged.cost;
            }
            None => self.lines.push(CartLine { supplier, line }),
        }
        Ok(())
    }

    /// Zero or less removes the line.
    pub fn set_quantity(
        &mut self,
        partner_id: &PartnerId,
        item_id: &str,
        quantity: Quantity,
    ) -> DomainResult<()> {
        let idx = self
            .position(partner_id, item_id)
            .ok_or_else(|| DomainError::validation(format!("item {item_id} is not in the cart")))?;

        if quantity <= Decimal::ZERO {
            self.lines.remove(idx);
        } else {
            self.lines[idx].line.quantity = quantity;
        }
        Ok(())
    }

    pub fn remove(&mut self, partner_id: &PartnerId, item_id: &str) -> bool {
        match self.position(partner_id, item_id) {
            Some(idx) => {
                self.lines.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn total(&self) -> DomainResult<Amount> {
        line::lines_total(self.lines.iter().map(|l| &l.line))
    }

    /// Spend per category, in first-seen order.
    pub fn category_totals(&self) -> DomainResult<Vec<(String, Amount)>> {
        line::category_totals(self.lines.iter().map(|l| &l.line), |l| l.category.clone())
    }

    /// One advisory per supplier scoring below `threshold`.
    pub fn risk_advisories(&self, threshold: u8) -> Vec<RiskAdvisory> {
        let mut risks: Vec<RiskAdvisory> = Vec::new();
        for CartLine { supplier, .. } in &self.lines {
            if supplier.score.is_risky(threshold)
                && !risks.iter().any(|r| r.partner_id == supplier.partner_id)
            {
                risks.push(RiskAdvisory {
                    partner_id: supplier.partner_id.clone(),
                    supplier_name: supplier.name.clone(),
                    score: supplier.score,
                });
            }
        }
        risks
    }

    /// One draft per supplier, suppliers in first-seen order.
    pub fn split_by_supplier(&self, mode: OrderMode) -> Vec<OrderDraft> {
        let mut drafts: Vec<OrderDraft> = Vec::new();
        for CartLine { supplier, line } in &self.lines {
            match drafts
                .iter_mut()
                .find(|d| d.supplier.partner_id == supplier.partner_id)
            {
                Some(draft) => draft.lines.push(line.clone()),
                None => {
                    let mut draft = OrderDraft::new(supplier.clone(), vec![line.clone()]);
                    draft.mode = mode;
                    drafts.push(draft);
                }
            }
        }
        drafts
    }

    fn position(&self, partner_id: &PartnerId, item_id: &str) -> Option<usize> {
        self.lines
            .iter()
            .position(|l| &l.supplier.partner_id == partner_id && l.line.item_id == item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procureflow_core::AggregateId;

    fn d(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn supplier(id: &str, score: u8) -> SupplierRef {
        SupplierRef {
            partner_id: PartnerId::new(AggregateId::from(id)),
            name: format!("Supplier {id}"),
            linked: None,
            network_verified: false,
            score: PerformanceScore::new(score).unwrap(),
        }
    }

    fn line(item: &str, qty: i64, cost: i64, category: &str) -> OrderLine {
        OrderLine::new(item, item, "pcs", d(qty), d(cost), category)
    }

    #[test]
    fn same_item_same_supplier_is_merged() {
        let mut cart = Cart::new();
        cart.add(supplier("SUP-A", 90), line("ING-1", 2, 100, "Dairy")).unwrap();
        cart.add(supplier("SUP-A", 90), line("ING-1", 3, 120, "Dairy")).unwrap();
        cart.add(supplier("SUP-B", 90), line("ING-1", 1, 100, "Dairy")).unwrap();

        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.lines()[0].line.quantity, d(5));
        assert_eq!(cart.total().unwrap(), d(700));
    }

    #[test]
    fn split_yields_one_draft_per_supplier() {
        let mut cart = Cart::new();
        cart.add(supplier("SUP-A", 90), line("ING-1", 1, 100, "Dairy")).unwrap();
        cart.add(supplier("SUP-B", 75), line("ING-2", 1, 50, "Dry")).unwrap();
        cart.add(supplier("SUP-A", 90), line("ING-3", 2, 10, "Dry")).unwrap();

        let drafts = cart.split_by_supplier(OrderMode::Po);
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].lines.len(), 2);
        assert_eq!(drafts[0].total().unwrap(), d(120));
        assert_eq!(drafts[1].supplier.partner_id.to_string(), "SUP-B");
    }

    #[test]
    fn low_scoring_supplier_raises_one_risk() {
        let mut cart = Cart::new();
        cart.add(supplier("SUP-A", 55), line("ING-1", 1, 100, "Dairy")).unwrap();
        cart.add(supplier("SUP-A", 55), line("ING-2", 1, 100, "Dairy")).unwrap();
        cart.add(supplier("SUP-B", 60), line("ING-3", 1, 100, "Dairy")).unwrap();

        let risks = cart.risk_advisories(60);
        assert_eq!(risks.len(), 1);
        assert_eq!(risks[0].score.value(), 55);
    }

    #[test]
    fn category_totals_and_quantity_edits() {
        let mut cart = Cart::new();
        let a = supplier("SUP-A", 90);
        cart.add(a.clone(), line("ING-1", 2, 100, "Dairy")).unwrap();
        cart.add(a.clone(), line("ING-2", 1, 40, "Dry")).unwrap();
        cart.set_quantity(&a.partner_id, "ING-1", d(4)).unwrap();

        assert_eq!(
            cart.category_totals().unwrap(),
            vec![("Dairy".to_string(), d(400)), ("Dry".to_string(), d(40))]
        );

        cart.set_quantity(&a.partner_id, "ING-2", d(0)).unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert!(cart.remove(&a.partner_id, "ING-1"));
        assert!(cart.is_empty());
    }

    #[test]
    fn invalid_line_is_not_added() {
        let mut cart = Cart::new();
        assert!(cart.add(supplier("SUP-A", 90), line("ING-1", 0, 100, "Dairy")).is_err());
        assert!(cart.is_empty());
    }

    #[test]
    fn merge_that_cannot_be_priced_is_refused() {
        let mut cart = Cart::new();
        let huge = OrderLine::new("ING-1", "Fresh Milk", "l", Decimal::MAX / d(4), d(3), "Dairy");
        cart.add(supplier("SUP-A", 90), huge.clone()).unwrap();

        let err = cart.add(supplier("SUP-A", 90), huge.clone()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("Fresh Milk")));
        assert_eq!(cart.lines()[0].line.quantity, huge.quantity);
    }
}

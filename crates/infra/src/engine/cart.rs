use serde_json::Value as JsonValue;
use tracing::debug;

use procureflow_core::{Amount, BusinessId};
use procureflow_events::{EventBus, EventEnvelope};
use procureflow_purchasing::{Cart, CartReview, LocalStock, OrderLine, line};

use super::{EngineError, EngineResult, ProcurementEngine};
use crate::event_store::EventStore;

impl<S, B> ProcurementEngine<S, B>
where
    S: EventStore + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    /// What the buyer sees before submitting: total, budget impact per
    /// category, risky suppliers and what is already on the shelf.
    ///
    /// Advisory only; nothing here blocks a submission.
    pub fn review_cart(&self, business_id: BusinessId, cart: &Cart) -> EngineResult<CartReview> {
        if cart.is_empty() {
            return Err(EngineError::validation("cart is empty"));
        }

        let lines: Vec<OrderLine> = cart.lines().iter().map(|l| l.line.clone()).collect();

        let mut budget = Vec::new();
        for (category, amount) in self.attributed_totals(business_id, &lines)? {
            match self.budget.assess(business_id, &category, amount)? {
                Some(assessment) => budget.push(assessment),
                None => debug!(%business_id, category, "no budget envelope for category"),
            }
        }

        let mut local_stock: Vec<LocalStock> = Vec::new();
        for line in &lines {
            if local_stock.iter().any(|s| s.item_id == line.item_id) {
                continue;
            }
            if let Some(on_hand) = self.catalog.lookup_local_stock(business_id, &line.name) {
                local_stock.push(LocalStock {
                    item_id: line.item_id.clone(),
                    name: line.name.clone(),
                    on_hand,
                });
            }
        }

        Ok(CartReview {
            total: cart.total()?,
            budget,
            risks: cart.risk_advisories(self.config.risk_score_threshold),
            local_stock,
        })
    }

    /// Spend per category, in first-seen order. The catalog's category for
    /// an item wins over the one carried on the line.
    pub(crate) fn attributed_totals(
        &self,
        business_id: BusinessId,
        lines: &[OrderLine],
    ) -> EngineResult<Vec<(String, Amount)>> {
        Ok(line::category_totals(lines, |l| {
            self.catalog
                .lookup_category(business_id, &l.item_id)
                .unwrap_or_else(|| l.category.clone())
        })?)
    }
}

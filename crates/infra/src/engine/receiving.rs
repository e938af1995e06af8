//! Goods receipt: the buyer's reconciliation of a shipped order.
//!
//! Completion commits the order first. Stock and the payables journal are
//! keyed by the order id, so they are re-applied safely when a completion is
//! repeated after a partial failure.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use uuid::Uuid;

use procureflow_accounting::{
    Account, JournalCommand, JournalEntryLine, Ledger, LedgerId, PostJournalEntry,
};
use procureflow_core::{AggregateId, BusinessId};
use procureflow_events::{EventBus, EventEnvelope};
use procureflow_inventory::{ReceiveStock, RegisterItem, StockCommand, StockItemId};
use procureflow_purchasing::{
    Actor, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderId, ReceiveGoods, ReceivingSession,
    Settlement,
};

use super::{EngineError, EngineResult, LEDGER_TYPE, ProcurementEngine};
use crate::event_store::EventStore;
use crate::services::NotificationKind;

impl<S, B> ProcurementEngine<S, B>
where
    S: EventStore + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    /// Open a receiving session on a shipped order. Every line starts as
    /// received in full.
    pub fn start_receiving(&self, business_id: BusinessId, order_id: &PurchaseOrderId) -> EngineResult<ReceivingSession> {
        let order = self.load_order(business_id, order_id)?;
        Ok(ReceivingSession::start(&order)?)
    }

    /// Commit a finished session: order to `received`, stock in, journal
    /// entry posted, seller notified.
    pub fn complete_receiving(
        &self,
        business_id: BusinessId,
        session: ReceivingSession,
        actor: &Actor,
        note: Option<String>,
    ) -> EngineResult<PurchaseOrder> {
        let order_id = PurchaseOrderId(session.order_id().clone());
        let _ticket = self.in_flight.try_acquire(business_id, &order_id.0)?;

        let outcome = session.complete(Utc::now(), note)?;
        let cmd = PurchaseOrderCommand::ReceiveGoods(ReceiveGoods {
            business_id,
            order_id: order_id.clone(),
            outcome,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        let (order, events) = self.execute_order(business_id, &order_id, cmd)?;

        self.receive_stock(business_id, &order)?;
        self.post_receipt(business_id, &order)?;

        if !events.is_empty() {
            info!(
                %business_id,
                %order_id,
                total_bill = %order.total_bill().unwrap_or_default(),
                payment_status = ?order.payment_status(),
                "goods received"
            );
            if let Some(supplier) = order.supplier() {
                let recipient = match order.b2b_link() {
                    Some(link) => link.seller_business_id.to_string(),
                    None => supplier.partner_id.to_string(),
                };
                self.notify(business_id, recipient, NotificationKind::GoodsReceived, &order_id.0);
            }
        }
        Ok(order)
    }

    /// Add what arrived to stock, one receipt per item and order.
    fn receive_stock(&self, business_id: BusinessId, order: &PurchaseOrder) -> EngineResult<()> {
        let reference = order.id_typed().to_string();
        for line in order.lines() {
            let quantity = line.received_quantity.unwrap_or(line.quantity);
            if quantity <= Decimal::ZERO {
                continue;
            }

            let item_id = StockItemId(AggregateId::from(line.item_id.as_str()));
            if !self.load_stock_item(business_id, &item_id)?.is_created() {
                let category = self
                    .catalog
                    .lookup_category(business_id, &line.item_id)
                    .unwrap_or_else(|| line.category.clone());
                debug!(%business_id, item_id = %item_id, "registering item first seen on receipt");
                self.execute_stock(
                    business_id,
                    &item_id,
                    StockCommand::RegisterItem(RegisterItem {
                        business_id,
                        item_id: item_id.clone(),
                        name: line.name.clone(),
                        unit: line.unit.clone(),
                        category,
                        occurred_at: Utc::now(),
                    }),
                )?;
            }

            self.execute_stock(
                business_id,
                &item_id,
                StockCommand::ReceiveStock(ReceiveStock {
                    business_id,
                    item_id: item_id.clone(),
                    quantity,
                    reference: reference.clone(),
                    occurred_at: Utc::now(),
                }),
            )?;
        }
        Ok(())
    }

    /// Debit inventory, credit whatever pays the supplier.
    fn post_receipt(&self, business_id: BusinessId, order: &PurchaseOrder) -> EngineResult<()> {
        let (Some(total), Some(settlement)) = (order.total_bill(), order.settlement()) else {
            return Ok(());
        };
        if total <= Decimal::ZERO {
            debug!(%business_id, order_id = %order.id_typed(), "nothing billed, no journal entry");
            return Ok(());
        }

        let credit = match settlement {
            Settlement::Cash => Account::cash(),
            Settlement::Transfer { source_account } => Account::bank(source_account),
            Settlement::Tempo { .. } => Account::accounts_payable(),
        };
        let ledger_id = LedgerId::purchasing();
        let supplier = order.supplier().map(|s| s.name.as_str()).unwrap_or_default();

        let attempts = self.config.commit_retry_limit.max(1);
        for attempt in 1..=attempts {
            let cmd = JournalCommand::PostJournalEntry(PostJournalEntry {
                business_id,
                ledger_id: ledger_id.clone(),
                entry_id: Uuid::now_v7(),
                reference: order.id_typed().to_string(),
                lines: vec![
                    JournalEntryLine::debit(Account::inventory(), total),
                    JournalEntryLine::credit(credit.clone(), total),
                ],
                due_date: order.due_date(),
                occurred_at: Utc::now(),
                description: Some(format!("goods received from {supplier}")),
            });
            match self.run::<Ledger>(business_id, &ledger_id.0, LEDGER_TYPE, cmd, |_, id| {
                Ledger::empty(LedgerId(id))
            }) {
                Ok(events) => {
                    if !events.is_empty() {
                        info!(%business_id, order_id = %order.id_typed(), %total, account = %credit.code, "receipt posted");
                    }
                    return Ok(());
                }
                Err(EngineError::ConcurrencyConflict(_)) => {
                    debug!(%business_id, attempt, "journal post lost the race, retrying");
                    std::thread::yield_now();
                }
                Err(other) => return Err(other),
            }
        }

        warn!(%business_id, order_id = %order.id_typed(), attempts, "journal post gave up");
        Err(EngineError::ConcurrencyConflict(format!(
            "receipt for {} was not posted after {attempts} attempts",
            order.id_typed()
        )))
    }

    /// Whether the receipt for `order_id` is in the payables journal.
    pub fn receipt_posted(&self, business_id: BusinessId, order_id: &PurchaseOrderId) -> EngineResult<bool> {
        let ledger_id = LedgerId::purchasing();
        let ledger = self
            .dispatcher
            .load(business_id, ledger_id.0.clone(), |_, id| Ledger::empty(LedgerId(id)))?;
        Ok(ledger.has_posted(&order_id.to_string()))
    }
}

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procureflow_core::{
    Aggregate, AggregateId, AggregateRoot, BusinessId, DomainError, Quantity,
};
use procureflow_events::Event;

/// Stock item (ingredient) identifier, scoped to one business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockItemId(pub AggregateId);

impl StockItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::generate("ING"))
    }
}

impl core::fmt::Display for StockItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: StockItem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockItem {
    id: StockItemId,
    business_id: Option<BusinessId>,
    name: String,
    unit: String,
    category: String,
    on_hand: Quantity,
    /// Receipt references already booked (one per purchase order).
    receipts: BTreeSet<String>,
    version: u64,
    created: bool,
}

impl StockItem {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: StockItemId) -> Self {
        Self {
            id,
            business_id: None,
            name: String::new(),
            unit: String::new(),
            category: String::new(),
            on_hand: Decimal::ZERO,
            receipts: BTreeSet::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> &StockItemId {
        &self.id
    }

    pub fn business_id(&self) -> Option<BusinessId> {
        self.business_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn on_hand(&self) -> Quantity {
        self.on_hand
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn has_receipt(&self, reference: &str) -> bool {
        self.receipts.contains(reference)
    }
}

impl AggregateRoot for StockItem {
    type Id = StockItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterItem {
    pub business_id: BusinessId,
    pub item_id: StockItemId,
    pub name: String,
    pub unit: String,
    pub category: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveStock (goods booked in from a purchase order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub business_id: BusinessId,
    pub item_id: StockItemId,
    pub quantity: Quantity,
    /// Purchase order the goods came from; a reference is booked at most once.
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock (manual correction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub business_id: BusinessId,
    pub item_id: StockItemId,
    pub delta: Quantity,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCommand {
    RegisterItem(RegisterItem),
    ReceiveStock(ReceiveStock),
    AdjustStock(AdjustStock),
}

/// Event: ItemRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRegistered {
    pub business_id: BusinessId,
    pub item_id: StockItemId,
    pub name: String,
    pub unit: String,
    pub category: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    pub business_id: BusinessId,
    pub item_id: StockItemId,
    pub quantity: Quantity,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub business_id: BusinessId,
    pub item_id: StockItemId,
    pub delta: Quantity,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    ItemRegistered(ItemRegistered),
    StockReceived(StockReceived),
    StockAdjusted(StockAdjusted),
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::ItemRegistered(_) => "inventory.item.registered",
            StockEvent::StockReceived(_) => "inventory.item.stock_received",
            StockEvent::StockAdjusted(_) => "inventory.item.stock_adjusted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::ItemRegistered(e) => e.occurred_at,
            StockEvent::StockReceived(e) => e.occurred_at,
            StockEvent::StockAdjusted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockItem {
    type Command = StockCommand;
    type Event = StockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::ItemRegistered(e) => {
                self.id = e.item_id.clone();
                self.business_id = Some(e.business_id);
                self.name = e.name.clone();
                self.unit = e.unit.clone();
                self.category = e.category.clone();
                self.on_hand = Decimal::ZERO;
                self.created = true;
            }
            StockEvent::StockReceived(e) => {
                self.on_hand += e.quantity;
                self.receipts.insert(e.reference.clone());
            }
            StockEvent::StockAdjusted(e) => {
                self.on_hand += e.delta;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::RegisterItem(cmd) => self.handle_register(cmd),
            StockCommand::ReceiveStock(cmd) => self.handle_receive(cmd),
            StockCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
        }
    }
}

impl StockItem {
    fn ensure_existing(&self, business_id: BusinessId, item_id: &StockItemId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.business_id != Some(business_id) {
            return Err(DomainError::invariant("business mismatch"));
        }
        if &self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterItem) -> Result<Vec<StockEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("item already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("item name cannot be empty"));
        }
        if cmd.category.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "item '{}' needs a budget category",
                cmd.name.trim()
            )));
        }

        Ok(vec![StockEvent::ItemRegistered(ItemRegistered {
            business_id: cmd.business_id,
            item_id: cmd.item_id.clone(),
            name: cmd.name.trim().to_string(),
            unit: cmd.unit.trim().to_string(),
            category: cmd.category.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveStock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_existing(cmd.business_id, &cmd.item_id)?;

        if cmd.quantity < Decimal::ZERO {
            return Err(DomainError::validation("received quantity cannot be negative"));
        }
        if self.receipts.contains(&cmd.reference) {
            return Ok(vec![]);
        }

        Ok(vec![StockEvent::StockReceived(StockReceived {
            business_id: cmd.business_id,
            item_id: cmd.item_id.clone(),
            quantity: cmd.quantity,
            reference: cmd.reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_existing(cmd.business_id, &cmd.item_id)?;

        if cmd.delta.is_zero() {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        if self.on_hand + cmd.delta < Decimal::ZERO {
            return Err(DomainError::invariant("stock cannot go negative"));
        }

        Ok(vec![StockEvent::StockAdjusted(StockAdjusted {
            business_id: cmd.business_id,
            item_id: cmd.item_id.clone(),
            delta: cmd.delta,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procureflow_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn registered_item(business_id: BusinessId) -> StockItem {
        let item_id = StockItemId::generate();
        let mut item = StockItem::empty(item_id.clone());
        execute(
            &mut item,
            &StockCommand::RegisterItem(RegisterItem {
                business_id,
                item_id,
                name: "Arabica beans".to_string(),
                unit: "kg".to_string(),
                category: "Coffee".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        item
    }

    #[test]
    fn receive_stock_increments_on_hand_once_per_reference() {
        let business_id = BusinessId::new();
        let mut item = registered_item(business_id);
        let cmd = StockCommand::ReceiveStock(ReceiveStock {
            business_id,
            item_id: item.id_typed().clone(),
            quantity: Decimal::new(12, 0),
            reference: "PO-1".to_string(),
            occurred_at: test_time(),
        });

        execute(&mut item, &cmd).unwrap();
        assert_eq!(item.on_hand(), Decimal::new(12, 0));
        assert!(item.has_receipt("PO-1"));

        // Replayed receipt is a no-op.
        assert!(execute(&mut item, &cmd).unwrap().is_empty());
        assert_eq!(item.on_hand(), Decimal::new(12, 0));
    }

    #[test]
    fn register_requires_category() {
        let item = StockItem::empty(StockItemId::generate());
        let err = item
            .handle(&StockCommand::RegisterItem(RegisterItem {
                business_id: BusinessId::new(),
                item_id: StockItemId::generate(),
                name: "Milk".to_string(),
                unit: "l".to_string(),
                category: " ".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("Milk")));
    }

    #[test]
    fn adjustment_cannot_drive_stock_negative() {
        let business_id = BusinessId::new();
        let item = registered_item(business_id);
        let err = item
            .handle(&StockCommand::AdjustStock(AdjustStock {
                business_id,
                item_id: item.id_typed().clone(),
                delta: Decimal::new(-1, 0),
                reason: "spillage".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn receive_for_other_business_is_rejected() {
        let item = registered_item(BusinessId::new());
        let err = item
            .handle(&StockCommand::ReceiveStock(ReceiveStock {
                business_id: BusinessId::new(),
                item_id: item.id_typed().clone(),
                quantity: Decimal::ONE,
                reference: "PO-9".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("business")));
    }
}

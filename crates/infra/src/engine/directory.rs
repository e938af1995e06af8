//! Partner directory and catalog maintenance.

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::info;

use procureflow_core::{BusinessId, Quantity};
use procureflow_events::{EventBus, EventEnvelope};
use procureflow_inventory::{AdjustStock, RegisterItem, StockCommand, StockItem, StockItemId};
use procureflow_partners::{
    ContactInfo, LinkedBusiness, Partner, PartnerCommand, PartnerId, PartnerStatus,
    PerformanceScore, RecordPerformance, RegisterPartner, SuspendPartner, VerifyLink,
};
use procureflow_purchasing::SupplierRef;

use super::{EngineError, EngineResult, PARTNER_TYPE, ProcurementEngine, STOCK_TYPE};
use crate::event_store::EventStore;
use crate::services::{CatalogItem, PartnerFilter, PartnerReadModel};

/// A supplier being added to a business's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPartner {
    /// Generated when absent.
    pub partner_id: Option<PartnerId>,
    pub name: String,
    pub category: String,
    pub contact: Option<ContactInfo>,
    /// The partner's own business on the network. Not trusted for B2B until verified.
    pub linked: Option<LinkedBusiness>,
    pub score: Option<PerformanceScore>,
}

impl NewPartner {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            partner_id: None,
            name: name.into(),
            category: category.into(),
            contact: None,
            linked: None,
            score: None,
        }
    }

    pub fn with_id(mut self, partner_id: PartnerId) -> Self {
        self.partner_id = Some(partner_id);
        self
    }

    pub fn with_score(mut self, score: PerformanceScore) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_link(mut self, linked: LinkedBusiness) -> Self {
        self.linked = Some(linked);
        self
    }
}

/// A catalog item being registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub item_id: Option<StockItemId>,
    pub name: String,
    pub unit: String,
    pub category: String,
}

impl NewItem {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            item_id: None,
            name: name.into(),
            unit: unit.into(),
            category: category.into(),
        }
    }

    pub fn with_id(mut self, item_id: StockItemId) -> Self {
        self.item_id = Some(item_id);
        self
    }
}

impl<S, B> ProcurementEngine<S, B>
where
    S: EventStore + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    pub fn register_partner(&self, business_id: BusinessId, partner: NewPartner) -> EngineResult<PartnerReadModel> {
        let partner_id = partner.partner_id.unwrap_or_else(PartnerId::generate);
        let cmd = PartnerCommand::RegisterPartner(RegisterPartner {
            business_id,
            partner_id: partner_id.clone(),
            name: partner.name,
            category: partner.category,
            contact: partner.contact,
            linked: partner.linked,
            score: partner.score,
            occurred_at: Utc::now(),
        });
        let row = self.execute_partner(business_id, &partner_id, cmd)?;
        info!(%business_id, partner_id = %row.partner_id, name = %row.name, "partner registered");
        Ok(row)
    }

    /// Confirm the partner's network identity; orders to it are mirrored from now on.
    pub fn verify_partner_link(
        &self,
        business_id: BusinessId,
        partner_id: &PartnerId,
        linked: LinkedBusiness,
    ) -> EngineResult<PartnerReadModel> {
        let cmd = PartnerCommand::VerifyLink(VerifyLink {
            business_id,
            partner_id: partner_id.clone(),
            linked,
            occurred_at: Utc::now(),
        });
        let row = self.execute_partner(business_id, partner_id, cmd)?;
        info!(%business_id, %partner_id, seller = %linked.business_id, "partner link verified");
        Ok(row)
    }

    pub fn record_partner_performance(
        &self,
        business_id: BusinessId,
        partner_id: &PartnerId,
        score: PerformanceScore,
    ) -> EngineResult<PartnerReadModel> {
        let cmd = PartnerCommand::RecordPerformance(RecordPerformance {
            business_id,
            partner_id: partner_id.clone(),
            score,
            occurred_at: Utc::now(),
        });
        self.execute_partner(business_id, partner_id, cmd)
    }

    pub fn suspend_partner(
        &self,
        business_id: BusinessId,
        partner_id: &PartnerId,
        reason: Option<String>,
    ) -> EngineResult<PartnerReadModel> {
        let cmd = PartnerCommand::SuspendPartner(SuspendPartner {
            business_id,
            partner_id: partner_id.clone(),
            reason,
            occurred_at: Utc::now(),
        });
        let row = self.execute_partner(business_id, partner_id, cmd)?;
        info!(%business_id, %partner_id, "partner suspended");
        Ok(row)
    }

    pub fn list_partners(&self, business_id: BusinessId, filter: &PartnerFilter) -> Vec<PartnerReadModel> {
        self.directory.list_partners(business_id, filter)
    }

    /// The supplier reference an order line is composed with.
    pub fn supplier(&self, business_id: BusinessId, partner_id: &PartnerId) -> EngineResult<SupplierRef> {
        let partner = self
            .dispatcher
            .load(business_id, partner_id.0.clone(), |_, id| Partner::empty(PartnerId(id)))?;
        if !partner.is_created() {
            return Err(EngineError::not_found(format!("partner {partner_id}")));
        }
        if partner.status() == PartnerStatus::Suspended {
            return Err(EngineError::validation(format!(
                "partner '{}' is suspended",
                partner.name()
            )));
        }
        Ok(SupplierRef::from_partner(&partner))
    }

    pub fn register_item(&self, business_id: BusinessId, item: NewItem) -> EngineResult<CatalogItem> {
        let item_id = item.item_id.unwrap_or_else(StockItemId::generate);
        let cmd = StockCommand::RegisterItem(RegisterItem {
            business_id,
            item_id: item_id.clone(),
            name: item.name,
            unit: item.unit,
            category: item.category,
            occurred_at: Utc::now(),
        });
        let entry = self.execute_stock(business_id, &item_id, cmd)?;
        info!(%business_id, item_id = %entry.item_id, category = %entry.category, "catalog item registered");
        Ok(entry)
    }

    /// Manual stock correction (stock take, spoilage).
    pub fn adjust_stock(
        &self,
        business_id: BusinessId,
        item_id: &StockItemId,
        delta: Quantity,
        reason: impl Into<String>,
    ) -> EngineResult<CatalogItem> {
        let cmd = StockCommand::AdjustStock(AdjustStock {
            business_id,
            item_id: item_id.clone(),
            delta,
            reason: reason.into(),
            occurred_at: Utc::now(),
        });
        self.execute_stock(business_id, item_id, cmd)
    }

    pub fn stock_on_hand(&self, business_id: BusinessId, item_id: &StockItemId) -> EngineResult<Quantity> {
        let item = self.load_stock_item(business_id, item_id)?;
        if !item.is_created() {
            return Err(EngineError::not_found(format!("item {item_id}")));
        }
        Ok(item.on_hand())
    }

    pub(crate) fn load_stock_item(&self, business_id: BusinessId, item_id: &StockItemId) -> EngineResult<StockItem> {
        Ok(self
            .dispatcher
            .load(business_id, item_id.0.clone(), |_, id| StockItem::empty(StockItemId(id)))?)
    }

    /// Run a stock command and refresh the catalog entry.
    pub(crate) fn execute_stock(
        &self,
        business_id: BusinessId,
        item_id: &StockItemId,
        cmd: StockCommand,
    ) -> EngineResult<CatalogItem> {
        self.run::<StockItem>(business_id, &item_id.0, STOCK_TYPE, cmd, |_, id| {
            StockItem::empty(StockItemId(id))
        })
        .map_err(|e| e.or_not_found(format!("item {item_id}")))?;

        let item = self.load_stock_item(business_id, item_id)?;
        let entry = CatalogItem::from_stock_item(&item);
        self.catalog.record_item(business_id, entry.clone());
        Ok(entry)
    }

    fn execute_partner(
        &self,
        business_id: BusinessId,
        partner_id: &PartnerId,
        cmd: PartnerCommand,
    ) -> EngineResult<PartnerReadModel> {
        self.run::<Partner>(business_id, &partner_id.0, PARTNER_TYPE, cmd, |_, id| {
            Partner::empty(PartnerId(id))
        })
        .map_err(|e| e.or_not_found(format!("partner {partner_id}")))?;

        let partner = self
            .dispatcher
            .load(business_id, partner_id.0.clone(), |_, id| Partner::empty(PartnerId(id)))?;
        let row = PartnerReadModel::from_partner(&partner);
        self.directory.add_partner(business_id, row.clone());
        Ok(row)
    }
}

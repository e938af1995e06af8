use std::sync::Arc;

use serde::Serialize;

use procureflow_core::{BusinessId, Quantity};
use procureflow_inventory::StockItem;

use crate::read_model::{BusinessStore, InMemoryBusinessStore};

/// One entry of the buyer's catalog, as last committed to the stock stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogItem {
    pub item_id: String,
    pub name: String,
    pub unit: String,
    pub category: String,
    pub on_hand: Quantity,
}

impl CatalogItem {
    pub fn from_stock_item(item: &StockItem) -> Self {
        Self {
            item_id: item.id_typed().to_string(),
            name: item.name().to_string(),
            unit: item.unit().to_string(),
            category: item.category().to_string(),
            on_hand: item.on_hand(),
        }
    }
}

/// Catalog/inventory lookups used while composing and receiving orders.
pub trait Catalog: Send + Sync {
    /// Buyer's current stock of an item, matched by name (case-insensitive).
    fn lookup_local_stock(&self, business_id: BusinessId, item_name: &str) -> Option<Quantity>;

    /// Category an item is budgeted under.
    fn lookup_category(&self, business_id: BusinessId, item_id: &str) -> Option<String>;

    /// Refresh an entry after its stock stream changed.
    fn record_item(&self, business_id: BusinessId, item: CatalogItem);
}

impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    fn lookup_local_stock(&self, business_id: BusinessId, item_name: &str) -> Option<Quantity> {
        (**self).lookup_local_stock(business_id, item_name)
    }

    fn lookup_category(&self, business_id: BusinessId, item_id: &str) -> Option<String> {
        (**self).lookup_category(business_id, item_id)
    }

    fn record_item(&self, business_id: BusinessId, item: CatalogItem) {
        (**self).record_item(business_id, item)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    items: InMemoryBusinessStore<String, CatalogItem>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self, business_id: BusinessId) -> Vec<CatalogItem> {
        let mut items = self.items.list(business_id);
        items.sort_by(|a, b| a.name.cmp(&b.name));
        items
    }
}

impl Catalog for InMemoryCatalog {
    fn lookup_local_stock(&self, business_id: BusinessId, item_name: &str) -> Option<Quantity> {
        let wanted = item_name.trim();
        self.items
            .list(business_id)
            .into_iter()
            .find(|i| i.name.eq_ignore_ascii_case(wanted))
            .map(|i| i.on_hand)
    }

    fn lookup_category(&self, business_id: BusinessId, item_id: &str) -> Option<String> {
        self.items
            .get(business_id, &item_id.to_string())
            .map(|i| i.category)
    }

    fn record_item(&self, business_id: BusinessId, item: CatalogItem) {
        self.items.upsert(business_id, item.item_id.clone(), item);
    }
}

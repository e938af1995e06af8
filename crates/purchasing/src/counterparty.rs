//! Who an order is placed with, and on behalf of whom.

use serde::{Deserialize, Serialize};

use procureflow_core::{BusinessId, OutletId, ValueObject};
use procureflow_partners::{LinkedBusiness, Partner, PartnerId, PerformanceScore};

/// Supplier as seen when the order was composed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierRef {
    pub partner_id: PartnerId,
    pub name: String,
    pub linked: Option<LinkedBusiness>,
    pub network_verified: bool,
    pub score: PerformanceScore,
}

impl SupplierRef {
    pub fn from_partner(partner: &Partner) -> Self {
        Self {
            partner_id: partner.id_typed().clone(),
            name: partner.name().to_string(),
            linked: partner.linked_business(),
            network_verified: partner.is_network_verified(),
            score: partner.performance_score(),
        }
    }

    /// Seller business the order is mirrored to, if it is eligible for B2B.
    pub fn b2b_target(&self) -> Option<LinkedBusiness> {
        if self.network_verified { self.linked } else { None }
    }
}

impl ValueObject for SupplierRef {}

/// The buying business and outlet placing an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessRef {
    pub business_id: BusinessId,
    pub outlet_id: OutletId,
    pub name: String,
}

impl BusinessRef {
    pub fn new(business_id: BusinessId, outlet_id: OutletId, name: impl Into<String>) -> Self {
        Self {
            business_id,
            outlet_id,
            name: name.into(),
        }
    }
}

impl ValueObject for BusinessRef {}

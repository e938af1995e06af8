use std::sync::Arc;

use serde::Serialize;

use procureflow_core::BusinessId;
use procureflow_partners::{
    LinkedBusiness, Partner, PartnerId, PartnerStatus, PerformanceScore, TrustBand,
};

use crate::read_model::{BusinessStore, InMemoryBusinessStore};

/// Directory row for one partner of a business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartnerReadModel {
    pub partner_id: PartnerId,
    pub name: String,
    pub category: String,
    pub score: PerformanceScore,
    pub band: TrustBand,
    pub network_verified: bool,
    pub linked: Option<LinkedBusiness>,
    pub status: PartnerStatus,
}

impl PartnerReadModel {
    pub fn from_partner(partner: &Partner) -> Self {
        Self {
            partner_id: partner.id_typed().clone(),
            name: partner.name().to_string(),
            category: partner.category().to_string(),
            score: partner.performance_score(),
            band: partner.trust_band(),
            network_verified: partner.is_network_verified(),
            linked: partner.linked_business(),
            status: partner.status(),
        }
    }
}

/// Filter for directory listings. The default lists every active partner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartnerFilter {
    pub category: Option<String>,
    pub band: Option<TrustBand>,
    pub verified_only: bool,
    pub include_suspended: bool,
    /// Case-insensitive substring of the partner name.
    pub query: Option<String>,
}

impl PartnerFilter {
    pub fn matches(&self, partner: &PartnerReadModel) -> bool {
        if !self.include_suspended && partner.status == PartnerStatus::Suspended {
            return false;
        }
        if self.verified_only && !partner.network_verified {
            return false;
        }
        if let Some(band) = self.band {
            if partner.band != band {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if !partner.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if let Some(query) = &self.query {
            let q = query.trim().to_lowercase();
            if !q.is_empty() && !partner.name.to_lowercase().contains(&q) {
                return false;
            }
        }
        true
    }
}

pub trait PartnerDirectory: Send + Sync {
    fn list_partners(&self, business_id: BusinessId, filter: &PartnerFilter) -> Vec<PartnerReadModel>;

    fn find_partner(&self, business_id: BusinessId, partner_id: &PartnerId) -> Option<PartnerReadModel>;

    /// Insert or refresh a directory row.
    fn add_partner(&self, business_id: BusinessId, partner: PartnerReadModel);
}

impl<D> PartnerDirectory for Arc<D>
where
    D: PartnerDirectory + ?Sized,
{
    fn list_partners(&self, business_id: BusinessId, filter: &PartnerFilter) -> Vec<PartnerReadModel> {
        (**self).list_partners(business_id, filter)
    }

    fn find_partner(&self, business_id: BusinessId, partner_id: &PartnerId) -> Option<PartnerReadModel> {
        (**self).find_partner(business_id, partner_id)
    }

    fn add_partner(&self, business_id: BusinessId, partner: PartnerReadModel) {
        (**self).add_partner(business_id, partner)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPartnerDirectory {
    rows: InMemoryBusinessStore<PartnerId, PartnerReadModel>,
}

impl InMemoryPartnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PartnerDirectory for InMemoryPartnerDirectory {
    /// Best performers first, then by name.
    fn list_partners(&self, business_id: BusinessId, filter: &PartnerFilter) -> Vec<PartnerReadModel> {
        let mut rows: Vec<_> = self
            .rows
            .list(business_id)
            .into_iter()
            .filter(|p| filter.matches(p))
            .collect();
        rows.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
        rows
    }

    fn find_partner(&self, business_id: BusinessId, partner_id: &PartnerId) -> Option<PartnerReadModel> {
        self.rows.get(business_id, partner_id)
    }

    fn add_partner(&self, business_id: BusinessId, partner: PartnerReadModel) {
        self.rows.upsert(business_id, partner.partner_id.clone(), partner);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procureflow_core::{
    Aggregate, AggregateId, AggregateRoot, BusinessId, DomainError, OutletId, ValueObject,
};
use procureflow_events::Event;

use crate::trust::{PerformanceScore, TrustBand};

/// Partner identifier (scoped to the business whose directory holds it).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartnerId(pub AggregateId);

impl PartnerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::generate("SUP"))
    }
}

impl core::fmt::Display for PartnerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Partner status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartnerStatus {
    Active,
    Suspended,
}

/// Contact information for a partner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl ValueObject for ContactInfo {}

/// The counter-party's own business/outlet on the network.
///
/// Present only for partners that run their own ledger; orders to them can be
/// mirrored into their inbox.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkedBusiness {
    pub business_id: BusinessId,
    pub outlet_id: OutletId,
}

impl ValueObject for LinkedBusiness {}

/// Aggregate root: Partner (a supplier in the buyer's directory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partner {
    id: PartnerId,
    business_id: Option<BusinessId>,
    name: String,
    category: String,
    contact: ContactInfo,
    linked: Option<LinkedBusiness>,
    network_verified: bool,
    score: PerformanceScore,
    status: PartnerStatus,
    version: u64,
    created: bool,
}

impl Partner {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PartnerId) -> Self {
        Self {
            id,
            business_id: None,
            name: String::new(),
            category: String::new(),
            contact: ContactInfo::default(),
            linked: None,
            network_verified: false,
            score: PerformanceScore::default(),
            status: PartnerStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> &PartnerId {
        &self.id
    }

    pub fn business_id(&self) -> Option<BusinessId> {
        self.business_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn linked_business(&self) -> Option<LinkedBusiness> {
        self.linked
    }

    pub fn is_network_verified(&self) -> bool {
        self.network_verified
    }

    pub fn performance_score(&self) -> PerformanceScore {
        self.score
    }

    pub fn trust_band(&self) -> TrustBand {
        self.score.band()
    }

    pub fn status(&self) -> PartnerStatus {
        self.status
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Whether orders to this partner are mirrored into the partner's own inbox.
    ///
    /// Requires a verified network link; everyone else is a manual-order supplier.
    pub fn accepts_b2b(&self) -> bool {
        self.status == PartnerStatus::Active && self.network_verified && self.linked.is_some()
    }
}

impl AggregateRoot for Partner {
    type Id = PartnerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterPartner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPartner {
    pub business_id: BusinessId,
    pub partner_id: PartnerId,
    pub name: String,
    pub category: String,
    pub contact: Option<ContactInfo>,
    /// Network identity, when the partner is itself on the network.
    pub linked: Option<LinkedBusiness>,
    pub score: Option<PerformanceScore>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub business_id: BusinessId,
    pub partner_id: PartnerId,
    pub name: Option<String>,
    pub category: Option<String>,
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPerformance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPerformance {
    pub business_id: BusinessId,
    pub partner_id: PartnerId,
    pub score: PerformanceScore,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VerifyLink (marks the partner as network-verified).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyLink {
    pub business_id: BusinessId,
    pub partner_id: PartnerId,
    pub linked: LinkedBusiness,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SuspendPartner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendPartner {
    pub business_id: BusinessId,
    pub partner_id: PartnerId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartnerCommand {
    RegisterPartner(RegisterPartner),
    UpdateDetails(UpdateDetails),
    RecordPerformance(RecordPerformance),
    VerifyLink(VerifyLink),
    SuspendPartner(SuspendPartner),
}

/// Event: PartnerRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerRegistered {
    pub business_id: BusinessId,
    pub partner_id: PartnerId,
    pub name: String,
    pub category: String,
    pub contact: ContactInfo,
    pub linked: Option<LinkedBusiness>,
    pub score: PerformanceScore,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartnerUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerUpdated {
    pub business_id: BusinessId,
    pub partner_id: PartnerId,
    pub name: String,
    pub category: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PerformanceRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceRecorded {
    pub business_id: BusinessId,
    pub partner_id: PartnerId,
    pub score: PerformanceScore,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LinkVerified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkVerified {
    pub business_id: BusinessId,
    pub partner_id: PartnerId,
    pub linked: LinkedBusiness,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartnerSuspended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerSuspended {
    pub business_id: BusinessId,
    pub partner_id: PartnerId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartnerEvent {
    PartnerRegistered(PartnerRegistered),
    PartnerUpdated(PartnerUpdated),
    PerformanceRecorded(PerformanceRecorded),
    LinkVerified(LinkVerified),
    PartnerSuspended(PartnerSuspended),
}

impl PartnerEvent {
    pub fn partner_id(&self) -> &PartnerId {
        match self {
            PartnerEvent::PartnerRegistered(e) => &e.partner_id,
            PartnerEvent::PartnerUpdated(e) => &e.partner_id,
            PartnerEvent::PerformanceRecorded(e) => &e.partner_id,
            PartnerEvent::LinkVerified(e) => &e.partner_id,
            PartnerEvent::PartnerSuspended(e) => &e.partner_id,
        }
    }
}

impl Event for PartnerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PartnerEvent::PartnerRegistered(_) => "partners.partner.registered",
            PartnerEvent::PartnerUpdated(_) => "partners.partner.updated",
            PartnerEvent::PerformanceRecorded(_) => "partners.partner.performance_recorded",
            PartnerEvent::LinkVerified(_) => "partners.partner.link_verified",
            PartnerEvent::PartnerSuspended(_) => "partners.partner.suspended",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PartnerEvent::PartnerRegistered(e) => e.occurred_at,
            PartnerEvent::PartnerUpdated(e) => e.occurred_at,
            PartnerEvent::PerformanceRecorded(e) => e.occurred_at,
            PartnerEvent::LinkVerified(e) => e.occurred_at,
            PartnerEvent::PartnerSuspended(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Partner {
    type Command = PartnerCommand;
    type Event = PartnerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PartnerEvent::PartnerRegistered(e) => {
                self.id = e.partner_id.clone();
                self.business_id = Some(e.business_id);
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.contact = e.contact.clone();
                self.linked = e.linked;
                // A link supplied at registration still needs explicit verification.
                self.network_verified = false;
                self.score = e.score;
                self.status = PartnerStatus::Active;
                self.created = true;
            }
            PartnerEvent::PartnerUpdated(e) => {
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.contact = e.contact.clone();
            }
            PartnerEvent::PerformanceRecorded(e) => {
                self.score = e.score;
            }
            PartnerEvent::LinkVerified(e) => {
                self.linked = Some(e.linked);
                self.network_verified = true;
            }
            PartnerEvent::PartnerSuspended(_) => {
                self.status = PartnerStatus::Suspended;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PartnerCommand::RegisterPartner(cmd) => self.handle_register(cmd),
            PartnerCommand::UpdateDetails(cmd) => self.handle_update(cmd),
            PartnerCommand::RecordPerformance(cmd) => self.handle_record_performance(cmd),
            PartnerCommand::VerifyLink(cmd) => self.handle_verify_link(cmd),
            PartnerCommand::SuspendPartner(cmd) => self.handle_suspend(cmd),
        }
    }
}

impl Partner {
    fn ensure_existing(&self, business_id: BusinessId, partner_id: &PartnerId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.business_id != Some(business_id) {
            return Err(DomainError::invariant("business mismatch"));
        }
        if &self.id != partner_id {
            return Err(DomainError::invariant("partner_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterPartner) -> Result<Vec<PartnerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("partner already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("partner name cannot be empty"));
        }
        if cmd.category.trim().is_empty() {
            return Err(DomainError::validation("partner category cannot be empty"));
        }
        if cmd.linked.is_some_and(|l| l.business_id == cmd.business_id) {
            return Err(DomainError::validation(
                "a business cannot list itself as a partner",
            ));
        }

        Ok(vec![PartnerEvent::PartnerRegistered(PartnerRegistered {
            business_id: cmd.business_id,
            partner_id: cmd.partner_id.clone(),
            name: cmd.name.trim().to_string(),
            category: cmd.category.trim().to_string(),
            contact: cmd.contact.clone().unwrap_or_default(),
            linked: cmd.linked,
            score: cmd.score.unwrap_or_default(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateDetails) -> Result<Vec<PartnerEvent>, DomainError> {
        self.ensure_existing(cmd.business_id, &cmd.partner_id)?;

        let name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if name.trim().is_empty() {
            return Err(DomainError::validation("partner name cannot be empty"));
        }
        let category = cmd.category.clone().unwrap_or_else(|| self.category.clone());
        if category.trim().is_empty() {
            return Err(DomainError::validation("partner category cannot be empty"));
        }

        Ok(vec![PartnerEvent::PartnerUpdated(PartnerUpdated {
            business_id: cmd.business_id,
            partner_id: cmd.partner_id.clone(),
            name,
            category,
            contact: cmd.contact.clone().unwrap_or_else(|| self.contact.clone()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_performance(
        &self,
        cmd: &RecordPerformance,
    ) -> Result<Vec<PartnerEvent>, DomainError> {
        self.ensure_existing(cmd.business_id, &cmd.partner_id)?;

        if cmd.score == self.score {
            return Ok(vec![]);
        }

        Ok(vec![PartnerEvent::PerformanceRecorded(PerformanceRecorded {
            business_id: cmd.business_id,
            partner_id: cmd.partner_id.clone(),
            score: cmd.score,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_verify_link(&self, cmd: &VerifyLink) -> Result<Vec<PartnerEvent>, DomainError> {
        self.ensure_existing(cmd.business_id, &cmd.partner_id)?;

        if cmd.linked.business_id == cmd.business_id {
            return Err(DomainError::validation(
                "a business cannot list itself as a partner",
            ));
        }
        if self.network_verified && self.linked == Some(cmd.linked) {
            return Ok(vec![]);
        }

        Ok(vec![PartnerEvent::LinkVerified(LinkVerified {
            business_id: cmd.business_id,
            partner_id: cmd.partner_id.clone(),
            linked: cmd.linked,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendPartner) -> Result<Vec<PartnerEvent>, DomainError> {
        self.ensure_existing(cmd.business_id, &cmd.partner_id)?;

        if self.status == PartnerStatus::Suspended {
            return Err(DomainError::conflict("partner is already suspended"));
        }

        Ok(vec![PartnerEvent::PartnerSuspended(PartnerSuspended {
            business_id: cmd.business_id,
            partner_id: cmd.partner_id.clone(),
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

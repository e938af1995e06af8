use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procureflow_core::{
    Aggregate, AggregateId, AggregateRoot, Amount, BusinessId, DomainError, money,
};
use procureflow_events::Event;

use crate::policy::{BudgetAssessment, BudgetPolicy};

/// Envelope identifier; one envelope stream per category per business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BudgetEnvelopeId(pub AggregateId);

impl BudgetEnvelopeId {
    /// Deterministic id for a category; category names are case-insensitive.
    pub fn for_category(category: &str) -> Self {
        let key = category.trim().to_lowercase();
        Self(AggregateId::from(format!("ENV-{key}").as_str()))
    }
}

impl core::fmt::Display for BudgetEnvelopeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: BudgetEnvelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetEnvelope {
    id: BudgetEnvelopeId,
    business_id: Option<BusinessId>,
    category: String,
    period: String,
    limit: Amount,
    spent: Amount,
    /// Commit references in the current period (one per order per category).
    committed: BTreeMap<String, Amount>,
    /// References handed back; they never commit again this period.
    released: BTreeSet<String>,
    version: u64,
    created: bool,
}

impl BudgetEnvelope {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: BudgetEnvelopeId) -> Self {
        Self {
            id,
            business_id: None,
            category: String::new(),
            period: String::new(),
            limit: Decimal::ZERO,
            spent: Decimal::ZERO,
            committed: BTreeMap::new(),
            released: BTreeSet::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> &BudgetEnvelopeId {
        &self.id
    }

    pub fn business_id(&self) -> Option<BusinessId> {
        self.business_id
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn period(&self) -> &str {
        &self.period
    }

    pub fn limit(&self) -> Amount {
        self.limit
    }

    pub fn spent(&self) -> Amount {
        self.spent
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// `spent / limit * 100`; `None` when no limit is set.
    pub fn percent(&self) -> Option<Decimal> {
        money::percent_of(self.spent, self.limit)
    }

    pub fn projected_spend(&self, additional: Amount) -> Amount {
        self.spent.saturating_add(additional)
    }

    pub fn projected_percent(&self, additional: Amount) -> Option<Decimal> {
        money::percent_of(self.projected_spend(additional), self.limit)
    }

    pub fn assess(&self, policy: &BudgetPolicy, additional: Amount) -> BudgetAssessment {
        policy.assess(&self.category, self.spent, self.limit, additional)
    }

    pub fn has_commit(&self, reference: &str) -> bool {
        self.committed.contains_key(reference)
    }

    pub fn was_released(&self, reference: &str) -> bool {
        self.released.contains(reference)
    }
}

impl AggregateRoot for BudgetEnvelope {
    type Id = BudgetEnvelopeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ConfigureEnvelope (creates the envelope or changes its limit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureEnvelope {
    pub business_id: BusinessId,
    pub envelope_id: BudgetEnvelopeId,
    pub category: String,
    pub limit: Amount,
    pub period: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CommitSpend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSpend {
    pub business_id: BusinessId,
    pub envelope_id: BudgetEnvelopeId,
    pub amount: Amount,
    /// Order the spend belongs to; committed at most once per period.
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseSpend (hands a commit back when its order will never be
/// fulfilled).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSpend {
    pub business_id: BusinessId,
    pub envelope_id: BudgetEnvelopeId,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartPeriod (resets `spent`, keeps the limit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartPeriod {
    pub business_id: BusinessId,
    pub envelope_id: BudgetEnvelopeId,
    pub period: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetCommand {
    ConfigureEnvelope(ConfigureEnvelope),
    CommitSpend(CommitSpend),
    ReleaseSpend(ReleaseSpend),
    StartPeriod(StartPeriod),
}

/// Event: EnvelopeConfigured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeConfigured {
    pub business_id: BusinessId,
    pub envelope_id: BudgetEnvelopeId,
    pub category: String,
    pub limit: Amount,
    pub period: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LimitChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitChanged {
    pub business_id: BusinessId,
    pub envelope_id: BudgetEnvelopeId,
    pub limit: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SpendCommitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendCommitted {
    pub business_id: BusinessId,
    pub envelope_id: BudgetEnvelopeId,
    pub amount: Amount,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SpendReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendReleased {
    pub business_id: BusinessId,
    pub envelope_id: BudgetEnvelopeId,
    pub amount: Amount,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PeriodStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodStarted {
    pub business_id: BusinessId,
    pub envelope_id: BudgetEnvelopeId,
    pub period: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetEvent {
    EnvelopeConfigured(EnvelopeConfigured),
    LimitChanged(LimitChanged),
    SpendCommitted(SpendCommitted),
    SpendReleased(SpendReleased),
    PeriodStarted(PeriodStarted),
}

impl Event for BudgetEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BudgetEvent::EnvelopeConfigured(_) => "budget.envelope.configured",
            BudgetEvent::LimitChanged(_) => "budget.envelope.limit_changed",
            BudgetEvent::SpendCommitted(_) => "budget.envelope.spend_committed",
            BudgetEvent::SpendReleased(_) => "budget.envelope.spend_released",
            BudgetEvent::PeriodStarted(_) => "budget.envelope.period_started",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BudgetEvent::EnvelopeConfigured(e) => e.occurred_at,
            BudgetEvent::LimitChanged(e) => e.occurred_at,
            BudgetEvent::SpendCommitted(e) => e.occurred_at,
            BudgetEvent::SpendReleased(e) => e.occurred_at,
            BudgetEvent::PeriodStarted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for BudgetEnvelope {
    type Command = BudgetCommand;
    type Event = BudgetEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BudgetEvent::EnvelopeConfigured(e) => {
                self.id = e.envelope_id.clone();
                self.business_id = Some(e.business_id);
                self.category = e.category.clone();
                self.period = e.period.clone();
                self.limit = e.limit;
                self.spent = Decimal::ZERO;
                self.committed.clear();
                self.released.clear();
                self.created = true;
            }
            BudgetEvent::LimitChanged(e) => {
                self.limit = e.limit;
            }
            BudgetEvent::SpendCommitted(e) => {
                self.spent += e.amount;
                self.committed.insert(e.reference.clone(), e.amount);
            }
            BudgetEvent::SpendReleased(e) => {
                self.spent -= e.amount;
                self.committed.remove(&e.reference);
                self.released.insert(e.reference.clone());
            }
            BudgetEvent::PeriodStarted(e) => {
                self.period = e.period.clone();
                self.spent = Decimal::ZERO;
                self.committed.clear();
                self.released.clear();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BudgetCommand::ConfigureEnvelope(cmd) => self.handle_configure(cmd),
            BudgetCommand::CommitSpend(cmd) => self.handle_commit(cmd),
            BudgetCommand::ReleaseSpend(cmd) => self.handle_release(cmd),
            BudgetCommand::StartPeriod(cmd) => self.handle_start_period(cmd),
        }
    }
}

impl BudgetEnvelope {
    fn ensure_existing(
        &self,
        business_id: BusinessId,
        envelope_id: &BudgetEnvelopeId,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.business_id != Some(business_id) {
            return Err(DomainError::invariant("business mismatch"));
        }
        if &self.id != envelope_id {
            return Err(DomainError::invariant("envelope_id mismatch"));
        }
        Ok(())
    }

    fn handle_configure(&self, cmd: &ConfigureEnvelope) -> Result<Vec<BudgetEvent>, DomainError> {
        if cmd.limit < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "budget limit for '{}' cannot be negative",
                cmd.category
            )));
        }

        if self.created {
            self.ensure_existing(cmd.business_id, &cmd.envelope_id)?;
            if self.limit == cmd.limit {
                return Ok(vec![]);
            }
            return Ok(vec![BudgetEvent::LimitChanged(LimitChanged {
                business_id: cmd.business_id,
                envelope_id: cmd.envelope_id.clone(),
                limit: cmd.limit,
                occurred_at: cmd.occurred_at,
            })]);
        }

        if cmd.category.trim().is_empty() {
            return Err(DomainError::validation("budget category cannot be empty"));
        }
        if cmd.envelope_id != BudgetEnvelopeId::for_category(&cmd.category) {
            return Err(DomainError::invariant("envelope_id does not match category"));
        }

        Ok(vec![BudgetEvent::EnvelopeConfigured(EnvelopeConfigured {
            business_id: cmd.business_id,
            envelope_id: cmd.envelope_id.clone(),
            category: cmd.category.trim().to_string(),
            limit: cmd.limit,
            period: cmd.period.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_commit(&self, cmd: &CommitSpend) -> Result<Vec<BudgetEvent>, DomainError> {
        self.ensure_existing(cmd.business_id, &cmd.envelope_id)?;

        if cmd.amount < Decimal::ZERO {
            return Err(DomainError::validation("committed amount cannot be negative"));
        }
        if self.committed.contains_key(&cmd.reference) || self.released.contains(&cmd.reference) {
            return Ok(vec![]);
        }
        if self.spent.checked_add(cmd.amount).is_none() {
            return Err(DomainError::validation(format!(
                "spend for '{}' is too large to track",
                self.category
            )));
        }

        Ok(vec![BudgetEvent::SpendCommitted(SpendCommitted {
            business_id: cmd.business_id,
            envelope_id: cmd.envelope_id.clone(),
            amount: cmd.amount,
            reference: cmd.reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseSpend) -> Result<Vec<BudgetEvent>, DomainError> {
        self.ensure_existing(cmd.business_id, &cmd.envelope_id)?;

        // Unknown, already released, or committed in an earlier period.
        let Some(&amount) = self.committed.get(&cmd.reference) else {
            return Ok(vec![]);
        };

        Ok(vec![BudgetEvent::SpendReleased(SpendReleased {
            business_id: cmd.business_id,
            envelope_id: cmd.envelope_id.clone(),
            amount,
            reference: cmd.reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start_period(&self, cmd: &StartPeriod) -> Result<Vec<BudgetEvent>, DomainError> {
        self.ensure_existing(cmd.business_id, &cmd.envelope_id)?;

        if cmd.period.trim().is_empty() {
            return Err(DomainError::validation("period label cannot be empty"));
        }
        if cmd.period == self.period {
            return Ok(vec![]);
        }

        Ok(vec![BudgetEvent::PeriodStarted(PeriodStarted {
            business_id: cmd.business_id,
            envelope_id: cmd.envelope_id.clone(),
            period: cmd.period.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

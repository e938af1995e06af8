//! Budget ledger service ("digital envelope").
//!
//! Envelopes are event-sourced aggregates, one stream per category. The
//! `spent` counter is the one resource several submissions race for; commits
//! land through the dispatcher's version check and are retried on conflict,
//! so concurrent commits against one category are never lost.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use procureflow_budget::{
    BudgetAssessment, BudgetCommand, BudgetEnvelope, BudgetEnvelopeId, BudgetPolicy, CommitSpend,
    ConfigureEnvelope, ReleaseSpend, StartPeriod,
};
use procureflow_core::{Amount, BusinessId};
use procureflow_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::CommandDispatcher;
use crate::engine::{EngineError, EngineResult};
use crate::event_store::EventStore;

pub const AGGREGATE_TYPE: &str = "budget.envelope";

#[derive(Debug)]
pub struct BudgetLedger<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    policy: BudgetPolicy,
    retry_limit: u32,
}

impl<S, B> BudgetLedger<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>, policy: BudgetPolicy, retry_limit: u32) -> Self {
        Self {
            dispatcher,
            policy,
            retry_limit: retry_limit.max(1),
        }
    }

    pub fn policy(&self) -> &BudgetPolicy {
        &self.policy
    }

    /// Create the envelope for `category`, or change the limit of an existing one.
    pub fn configure(
        &self,
        business_id: BusinessId,
        category: &str,
        limit: Amount,
        period: &str,
    ) -> EngineResult<BudgetEnvelope> {
        let envelope_id = BudgetEnvelopeId::for_category(category);
        let cmd = BudgetCommand::ConfigureEnvelope(ConfigureEnvelope {
            business_id,
            envelope_id: envelope_id.clone(),
            category: category.to_string(),
            limit,
            period: period.to_string(),
            occurred_at: Utc::now(),
        });
        self.run(business_id, &envelope_id, cmd)?;
        info!(%business_id, category, %limit, period, "budget envelope configured");
        self.require(business_id, category)
    }

    /// Roll the envelope into a new period; spend restarts at zero.
    pub fn start_period(
        &self,
        business_id: BusinessId,
        category: &str,
        period: &str,
    ) -> EngineResult<BudgetEnvelope> {
        let envelope_id = BudgetEnvelopeId::for_category(category);
        let cmd = BudgetCommand::StartPeriod(StartPeriod {
            business_id,
            envelope_id: envelope_id.clone(),
            period: period.to_string(),
            occurred_at: Utc::now(),
        });
        self.run(business_id, &envelope_id, cmd)
            .map_err(|e| e.or_not_found(format!("budget envelope for '{category}'")))?;
        info!(%business_id, category, period, "budget period started");
        self.require(business_id, category)
    }

    /// `None` when no envelope is configured for the category.
    pub fn envelope(&self, business_id: BusinessId, category: &str) -> EngineResult<Option<BudgetEnvelope>> {
        let envelope_id = BudgetEnvelopeId::for_category(category);
        let envelope = self
            .dispatcher
            .load(business_id, envelope_id.0.clone(), |_, id| {
                BudgetEnvelope::empty(BudgetEnvelopeId(id))
            })?;
        Ok(envelope.is_created().then_some(envelope))
    }

    /// `spent + additional`; an unconfigured category has spent nothing.
    pub fn projected_spend(
        &self,
        business_id: BusinessId,
        category: &str,
        additional: Amount,
    ) -> EngineResult<Amount> {
        Ok(match self.envelope(business_id, category)? {
            Some(envelope) => envelope.projected_spend(additional),
            None => additional,
        })
    }

    /// Advisory for adding `additional` to the category. `None` when the
    /// category has no envelope.
    pub fn assess(
        &self,
        business_id: BusinessId,
        category: &str,
        additional: Amount,
    ) -> EngineResult<Option<BudgetAssessment>> {
        Ok(self
            .envelope(business_id, category)?
            .map(|envelope| envelope.assess(&self.policy, additional)))
    }

    /// Add `amount` to the category's spend, once per `reference`.
    ///
    /// Returns the envelope after the commit, or `None` when the category has
    /// no envelope (nothing to track).
    pub fn commit(
        &self,
        business_id: BusinessId,
        category: &str,
        amount: Amount,
        reference: &str,
    ) -> EngineResult<Option<BudgetEnvelope>> {
        if amount == Decimal::ZERO {
            return self.envelope(business_id, category);
        }

        let envelope_id = BudgetEnvelopeId::for_category(category);
        let landed = self.run_contended(business_id, category, "commit", || {
            BudgetCommand::CommitSpend(CommitSpend {
                business_id,
                envelope_id: envelope_id.clone(),
                amount,
                reference: reference.to_string(),
                occurred_at: Utc::now(),
            })
        })?;
        if landed {
            debug!(%business_id, category, %amount, reference, "budget spend committed");
        }
        self.envelope(business_id, category)
    }

    /// Hand back whatever `reference` committed to the category. A reference
    /// that never committed, or was already released, changes nothing.
    pub fn release(
        &self,
        business_id: BusinessId,
        category: &str,
        reference: &str,
    ) -> EngineResult<Option<BudgetEnvelope>> {
        let envelope_id = BudgetEnvelopeId::for_category(category);
        let landed = self.run_contended(business_id, category, "release", || {
            BudgetCommand::ReleaseSpend(ReleaseSpend {
                business_id,
                envelope_id: envelope_id.clone(),
                reference: reference.to_string(),
                occurred_at: Utc::now(),
            })
        })?;
        if landed {
            debug!(%business_id, category, reference, "budget spend released");
        }
        self.envelope(business_id, category)
    }

    /// Dispatch against the envelope, retrying lost version races. `false`
    /// when the category has no envelope.
    fn run_contended(
        &self,
        business_id: BusinessId,
        category: &str,
        action: &str,
        cmd: impl Fn() -> BudgetCommand,
    ) -> EngineResult<bool> {
        let envelope_id = BudgetEnvelopeId::for_category(category);
        for attempt in 1..=self.retry_limit {
            match self.run(business_id, &envelope_id, cmd()) {
                Ok(()) => return Ok(true),
                Err(EngineError::ConcurrencyConflict(_)) => {
                    debug!(%business_id, category, action, attempt, "budget write lost the race, retrying");
                    std::thread::yield_now();
                }
                Err(EngineError::NotFound(_)) => {
                    debug!(%business_id, category, action, "no budget envelope, spend not tracked");
                    return Ok(false);
                }
                Err(other) => return Err(other),
            }
        }

        warn!(%business_id, category, action, attempts = self.retry_limit, "budget write gave up");
        Err(EngineError::ConcurrencyConflict(format!(
            "budget {action} for '{category}' did not land after {} attempts",
            self.retry_limit
        )))
    }

    fn run(&self, business_id: BusinessId, envelope_id: &BudgetEnvelopeId, cmd: BudgetCommand) -> EngineResult<()> {
        self.dispatcher
            .dispatch::<BudgetEnvelope>(
                business_id,
                envelope_id.0.clone(),
                AGGREGATE_TYPE,
                cmd,
                |_, id| BudgetEnvelope::empty(BudgetEnvelopeId(id)),
            )
            .map(|_| ())
            .map_err(EngineError::from)
    }

    fn require(&self, business_id: BusinessId, category: &str) -> EngineResult<BudgetEnvelope> {
        self.envelope(business_id, category)?
            .ok_or_else(|| EngineError::not_found(format!("budget envelope for '{category}'")))
    }
}

//! Budget ledger domain module ("digital envelopes", event-sourced).
//!
//! One envelope per spending category: a period limit and the amount committed
//! against it so far, plus the advisory policy applied while composing a cart.

pub mod envelope;
pub mod policy;

pub use envelope::{
    BudgetCommand, BudgetEnvelope, BudgetEnvelopeId, BudgetEvent, CommitSpend, ConfigureEnvelope,
    EnvelopeConfigured, LimitChanged, PeriodStarted, ReleaseSpend, SpendCommitted, SpendReleased,
    StartPeriod,
};
pub use policy::{AdvisoryLevel, BudgetAssessment, BudgetPolicy};

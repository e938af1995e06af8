//! Engine configuration.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use procureflow_budget::BudgetPolicy;
use procureflow_core::Amount;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Orders above this total need sign-off unless placed by an owner or manager.
    pub approval_limit: Amount,
    pub budget_warning_percent: Decimal,
    /// Suppliers scoring below this raise a risk advisory.
    pub risk_score_threshold: u8,
    /// Turn an overbudget advisory into a rejected submission.
    pub enforce_budget: bool,
    /// Attempts at landing a budget commit under contention.
    pub commit_retry_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            approval_limit: Decimal::new(5_000_000, 0),
            budget_warning_percent: Decimal::new(80, 0),
            risk_score_threshold: 60,
            enforce_budget: false,
            commit_retry_limit: 16,
        }
    }
}

impl EngineConfig {
    /// Read `PROCUREFLOW_*` variables; anything missing or unparseable keeps its default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            approval_limit: parse_or(&lookup, "PROCUREFLOW_APPROVAL_LIMIT", defaults.approval_limit),
            budget_warning_percent: parse_or(
                &lookup,
                "PROCUREFLOW_BUDGET_WARNING_PERCENT",
                defaults.budget_warning_percent,
            ),
            risk_score_threshold: parse_or(
                &lookup,
                "PROCUREFLOW_RISK_SCORE_THRESHOLD",
                defaults.risk_score_threshold,
            ),
            enforce_budget: parse_or(&lookup, "PROCUREFLOW_ENFORCE_BUDGET", defaults.enforce_budget),
            commit_retry_limit: parse_or(
                &lookup,
                "PROCUREFLOW_COMMIT_RETRY_LIMIT",
                defaults.commit_retry_limit,
            ),
        }
    }

    pub fn budget_policy(&self) -> BudgetPolicy {
        BudgetPolicy::default().with_warning_percent(self.budget_warning_percent)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + core::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!(key, value = %raw, fallback = %default, "unparseable configuration value, using default");
            default
        }
    }
}

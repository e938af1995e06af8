//! Advisory thresholds for projected category spend.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procureflow_core::{Amount, money};

/// Severity of a budget advisory.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdvisoryLevel {
    /// Projected spend is above the warning threshold but within the limit.
    Warning,
    /// Projected spend exceeds the limit.
    Overbudget,
}

/// Thresholds, in percent of the envelope limit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetPolicy {
    pub warning_percent: Decimal,
    pub over_percent: Decimal,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            warning_percent: Decimal::new(80, 0),
            over_percent: Decimal::ONE_HUNDRED,
        }
    }
}

impl BudgetPolicy {
    pub fn with_warning_percent(mut self, warning_percent: Decimal) -> Self {
        self.warning_percent = warning_percent;
        self
    }

    /// Assess what committing `additional` against `spent`/`limit` would mean.
    pub fn assess(
        &self,
        category: &str,
        spent: Amount,
        limit: Amount,
        additional: Amount,
    ) -> BudgetAssessment {
        let projected_spend = spent.saturating_add(additional);
        let projected_percent = money::percent_of(projected_spend, limit);

        let level = match projected_percent {
            Some(p) if p > self.over_percent => Some(AdvisoryLevel::Overbudget),
            Some(p) if p > self.warning_percent => Some(AdvisoryLevel::Warning),
            Some(_) => None,
            // No limit configured: any spend at all is over budget.
            None if projected_spend > Decimal::ZERO => Some(AdvisoryLevel::Overbudget),
            None => None,
        };

        BudgetAssessment {
            category: category.to_string(),
            spent,
            limit,
            additional,
            projected_spend,
            projected_percent,
            level,
        }
    }
}

/// Outcome of a projected-spend check for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetAssessment {
    pub category: String,
    pub spent: Amount,
    pub limit: Amount,
    pub additional: Amount,
    pub projected_spend: Amount,
    /// `None` when the limit is zero.
    pub projected_percent: Option<Decimal>,
    pub level: Option<AdvisoryLevel>,
}

impl BudgetAssessment {
    pub fn is_over_budget(&self) -> bool {
        self.level == Some(AdvisoryLevel::Overbudget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    #[test]
    fn ninety_five_percent_is_a_warning() {
        let a = BudgetPolicy::default().assess("Dairy", d(850_000), d(1_000_000), d(100_000));
        assert_eq!(a.projected_spend, d(950_000));
        assert_eq!(a.projected_percent, Some(d(95)));
        assert_eq!(a.level, Some(AdvisoryLevel::Warning));
    }

    #[test]
    fn one_hundred_five_percent_is_overbudget() {
        let a = BudgetPolicy::default().assess("Dairy", d(850_000), d(1_000_000), d(200_000));
        assert_eq!(a.projected_percent, Some(d(105)));
        assert!(a.is_over_budget());
    }

    #[test]
    fn boundaries_are_exclusive_below() {
        let policy = BudgetPolicy::default();
        assert_eq!(policy.assess("x", d(0), d(100), d(80)).level, None);
        assert_eq!(
            policy.assess("x", d(0), d(100), d(100)).level,
            Some(AdvisoryLevel::Warning)
        );
        assert_eq!(
            policy.assess("x", d(0), d(100), d(101)).level,
            Some(AdvisoryLevel::Overbudget)
        );
    }

    #[test]
    fn zero_limit_flags_any_spend() {
        let policy = BudgetPolicy::default();
        assert!(policy.assess("x", d(0), d(0), d(1)).is_over_budget());
        assert_eq!(policy.assess("x", d(0), d(0), d(0)).level, None);
    }

    proptest! {
        #[test]
        fn projected_spend_is_spent_plus_additional(
            spent in 0i64..10_000_000,
            limit in 1i64..10_000_000,
            additional in 0i64..10_000_000,
        ) {
            let a = BudgetPolicy::default().assess("x", d(spent), d(limit), d(additional));
            prop_assert_eq!(a.projected_spend, d(spent + additional));
            prop_assert_eq!(a.is_over_budget(), spent + additional > limit);
        }
    }
}

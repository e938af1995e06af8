use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procureflow_core::{Amount, DomainError, DomainResult, Quantity, money};

use crate::receiving::DiscrepancyReason;

/// One purchase order line.
///
/// `received_quantity` and `discrepancy_reason` stay empty until the buyer
/// reconciles the delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    #[serde(rename = "ingredientId")]
    pub item_id: String,
    pub name: String,
    pub unit: String,
    pub quantity: Quantity,
    pub cost: Amount,
    /// Catalog category the line's spend is attributed to.
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_quantity: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discrepancy_reason: Option<DiscrepancyReason>,
}

impl OrderLine {
    pub fn new(
        item_id: impl Into<String>,
        name: impl Into<String>,
        unit: impl Into<String>,
        quantity: Quantity,
        cost: Amount,
        category: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            name: name.into(),
            unit: unit.into(),
            quantity,
            cost,
            category: category.into(),
            received_quantity: None,
            discrepancy_reason: None,
        }
    }

    /// `quantity * cost`, or a validation error naming the item when the
    /// product cannot be represented.
    pub fn amount(&self) -> DomainResult<Amount> {
        money::line_amount(self.quantity, self.cost).ok_or_else(|| {
            DomainError::validation(format!("amount for '{}' is too large", self.name))
        })
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.item_id.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "item '{}' has no item id",
                self.name
            )));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "quantity for '{}' must be positive",
                self.name
            )));
        }
        if self.cost < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "cost for '{}' must not be negative",
                self.name
            )));
        }
        self.amount()?;
        Ok(())
    }
}

/// `Σ(quantity * cost)`.
pub fn lines_total<'a>(lines: impl IntoIterator<Item = &'a OrderLine>) -> DomainResult<Amount> {
    let mut total = Decimal::ZERO;
    for line in lines {
        total = total.checked_add(line.amount()?).ok_or_else(|| {
            DomainError::validation(format!("order total overflows at '{}'", line.name))
        })?;
    }
    Ok(total)
}

/// Spend per category in first-seen order. `category_of` picks the category
/// each line is attributed to.
pub fn category_totals<'a>(
    lines: impl IntoIterator<Item = &'a OrderLine>,
    category_of: impl Fn(&OrderLine) -> String,
) -> DomainResult<Vec<(String, Amount)>> {
    let mut totals: Vec<(String, Amount)> = Vec::new();
    for line in lines {
        let amount = line.amount()?;
        let category = category_of(line);
        match totals.iter_mut().find(|(c, _)| *c == category) {
            Some((_, sum)) => {
                *sum = sum.checked_add(amount).ok_or_else(|| {
                    DomainError::validation(format!("'{category}' total overflows at '{}'", line.name))
                })?;
            }
            None => totals.push((category, amount)),
        }
    }
    Ok(totals)
}

/// Validate a line set for submission and return its total.
///
/// A caller-declared total must agree with the computed one within the
/// rounding tolerance.
pub fn validate_lines(lines: &[OrderLine], declared_total: Option<Amount>) -> DomainResult<Amount> {
    if lines.is_empty() {
        return Err(DomainError::validation("order must contain at least one item"));
    }
    for line in lines {
        line.validate()?;
    }

    let total = lines_total(lines)?;
    if total <= Decimal::ZERO {
        return Err(DomainError::validation("order total must be greater than zero"));
    }
    if let Some(declared) = declared_total {
        if !money::totals_match(declared, total) {
            return Err(DomainError::validation(format!(
                "declared total {declared} does not match item total {total}"
            )));
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    #[test]
    fn empty_order_is_rejected() {
        let err = validate_lines(&[], None).unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("order must contain at least one item")
        );
    }

    #[test]
    fn zero_quantity_names_the_item() {
        let line = OrderLine::new("ING-1", "Fresh Milk", "l", d(0), d(1000), "Dairy");
        let err = validate_lines(&[line], None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("Fresh Milk")));
    }

    #[test]
    fn zero_total_is_rejected() {
        let line = OrderLine::new("ING-1", "Sample", "pcs", d(3), d(0), "Misc");
        assert!(validate_lines(&[line], None).is_err());
    }

    #[test]
    fn declared_total_within_tolerance_is_accepted() {
        let line = OrderLine::new("ING-1", "Sugar", "kg", Decimal::new(15, 1), Decimal::new(333, 2), "Dry");
        // 1.5 * 3.33 = 4.995
        assert_eq!(validate_lines(&[line.clone()], Some(Decimal::new(500, 2))).unwrap(), Decimal::new(4995, 3));
        assert!(validate_lines(&[line], Some(Decimal::new(502, 2))).is_err());
    }

    #[test]
    fn unrepresentable_amount_names_the_item() {
        let line = OrderLine::new("ING-1", "Fresh Milk", "l", Decimal::MAX, d(2), "Dairy");
        let err = validate_lines(&[line], None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("Fresh Milk")));

        let a = OrderLine::new("ING-1", "Fresh Milk", "l", Decimal::MAX, d(1), "Dairy");
        let b = OrderLine::new("ING-2", "Cream", "l", d(1), d(1), "Dairy");
        let err = lines_total(&[a, b]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("Cream")));
    }

    #[test]
    fn wire_field_is_ingredient_id() {
        let line = OrderLine::new("ING-1", "Sugar", "kg", d(1), d(10), "Dry");
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["ingredientId"], "ING-1");
        assert!(json.get("receivedQuantity").is_none());
    }
}

//! Amount and quantity helpers.
//!
//! Single-currency: amounts are plain `Decimal`s in the business's currency.

use rust_decimal::Decimal;

/// Monetary amount (single currency).
pub type Amount = Decimal;

/// Physical quantity in the item's unit (may be fractional, e.g. kg).
pub type Quantity = Decimal;

/// Absolute tolerance used when comparing a stored total against the sum of
/// its lines.
pub fn total_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

/// `quantity * cost`; `None` when the product does not fit in a `Decimal`.
pub fn line_amount(quantity: Quantity, cost: Amount) -> Option<Amount> {
    quantity.checked_mul(cost)
}

/// Running total that stops at the first unrepresentable sum.
pub fn checked_sum(amounts: impl IntoIterator<Item = Amount>) -> Option<Amount> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount))
}

/// Whether two totals agree within [`total_tolerance`].
pub fn totals_match(expected: Amount, actual: Amount) -> bool {
    (expected - actual).abs() <= total_tolerance()
}

/// `part / whole * 100`. Returns `None` when `whole` is zero or the ratio
/// does not fit in a `Decimal`.
pub fn percent_of(part: Decimal, whole: Decimal) -> Option<Decimal> {
    if whole.is_zero() {
        return None;
    }
    part.checked_div(whole)?.checked_mul(Decimal::ONE_HUNDRED)
}

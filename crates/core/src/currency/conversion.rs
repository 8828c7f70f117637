//! Currency conversion logic.
//!
//! CRITICAL: Rounding strategy for multi-currency:
//! - Always round to the *target* currency's decimal places
//! - Use banker's rounding (round half to even)
//! - IDR has no minor unit, everything else rounds to 2 places

use pricebook_shared::types::Currency;
use rust_decimal::Decimal;

/// Converts an amount into `target` using the given exchange rate.
///
/// `rate` is expressed as units of `target` per 1 unit of the source currency.
/// Returns `None` when the product does not fit in a `Decimal`.
#[must_use]
pub fn convert_amount(amount: Decimal, rate: Decimal, target: Currency) -> Option<Decimal> {
    amount.checked_mul(rate).map(|value| target.round(value))
}

/// Converts an amount into `target` by dividing through the given rate.
///
/// `rate` is expressed as units of the source currency per 1 unit of `target`.
/// Returns `None` for a zero rate or a quotient that does not fit.
#[must_use]
pub fn divide_amount(amount: Decimal, rate: Decimal, target: Currency) -> Option<Decimal> {
    amount.checked_div(rate).map(|value| target.round(value))
}

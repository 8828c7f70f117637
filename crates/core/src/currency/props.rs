//! Property-based tests for currency linkage and conversion.
//!
//! - Derivation is deterministic
//! - IDR derivations carry no minor units, CNY derivations at most two
//! - CNY -> IDR -> CNY round-trips exactly for realistic rates

use proptest::prelude::*;
use pricebook_shared::types::Currency;
use rust_decimal::Decimal;

use super::conversion::convert_amount;
use super::exchange::{ExchangeRateRecord, find_rate};
use super::linkage::{CurrencyLinkageCalculator, LinkageMode};

/// Strategy to generate CNY amounts (0.01 to 1,000,000.00).
fn cny_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy to generate IDR amounts (1 to 10,000,000,000).
fn idr_amount() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000_000i64).prop_map(Decimal::from)
}

/// Strategy to generate IDR-per-CNY rates (1000.0000 to 20000.0000).
fn idr_per_cny_rate() -> impl Strategy<Value = Decimal> {
    (10_000_000i64..200_000_000i64).prop_map(|v| Decimal::new(v, 4))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Calling derive twice with the same inputs yields the same output.
    #[test]
    fn prop_derive_is_deterministic(
        amount in cny_amount(),
        rate in idr_per_cny_rate(),
    ) {
        let first = CurrencyLinkageCalculator::derive_amount(
            Currency::Cny, amount, rate, LinkageMode::PrimaryIsCny,
        );
        let second = CurrencyLinkageCalculator::derive_amount(
            Currency::Cny, amount, rate, LinkageMode::PrimaryIsCny,
        );
        prop_assert_eq!(first, second);
    }

    /// Derived IDR amounts are whole units.
    #[test]
    fn prop_derived_idr_is_whole(
        amount in cny_amount(),
        rate in idr_per_cny_rate(),
    ) {
        let derived = CurrencyLinkageCalculator::derive_amount(
            Currency::Cny, amount, rate, LinkageMode::PrimaryIsCny,
        ).unwrap();
        prop_assert_eq!(derived, derived.trunc());
    }

    /// Derived CNY amounts have at most two decimal places.
    #[test]
    fn prop_derived_cny_has_two_decimals(
        amount in idr_amount(),
        rate in idr_per_cny_rate(),
    ) {
        let derived = CurrencyLinkageCalculator::derive_amount(
            Currency::Idr, amount, rate, LinkageMode::PrimaryIsIdr,
        ).unwrap();
        let scaled = derived * Decimal::ONE_HUNDRED;
        prop_assert_eq!(scaled, scaled.trunc());
    }

    /// CNY -> IDR -> CNY returns the original amount.
    #[test]
    fn prop_cny_round_trip(
        amount in cny_amount(),
        rate in idr_per_cny_rate(),
    ) {
        let idr = CurrencyLinkageCalculator::derive_amount(
            Currency::Cny, amount, rate, LinkageMode::PrimaryIsCny,
        ).unwrap();
        let back = CurrencyLinkageCalculator::derive_amount(
            Currency::Idr, idr, rate, LinkageMode::PrimaryIsIdr,
        ).unwrap();
        prop_assert_eq!(back, amount);
    }

    /// Converting through the inverse rate lands within rounding tolerance.
    #[test]
    fn prop_inverse_conversion_symmetry(
        amount in cny_amount(),
        rate in idr_per_cny_rate(),
    ) {
        let as_of = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH;
        let records = vec![ExchangeRateRecord::new(Currency::Cny, Currency::Idr, rate, as_of)];

        let forward = find_rate(&records, Currency::Cny, Currency::Idr, as_of).unwrap();
        let backward = find_rate(&records, Currency::Idr, Currency::Cny, as_of).unwrap();

        let idr = convert_amount(amount, forward.rate, Currency::Idr).unwrap();
        let cny = convert_amount(idr, backward.rate, Currency::Cny).unwrap();
        prop_assert!((cny - amount).abs() <= Decimal::new(1, 2));
    }
}

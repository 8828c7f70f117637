//! Currency linkage: deriving one currency's amount from the other.
//!
//! While a linkage mode is active the primary currency is the single source
//! of truth. Edits to the secondary field never flow back into the primary.

use pricebook_shared::types::Currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::conversion::{convert_amount, divide_amount};
use crate::pricing::types::PriceAmounts;

/// Rule governing whether editing one currency derives the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LinkageMode {
    /// No auto-derivation; both currencies are entered explicitly.
    #[default]
    #[serde(rename = "none")]
    None,
    /// CNY is entered, IDR is derived as `cny * rate`.
    #[serde(rename = "primaryIsCNY")]
    PrimaryIsCny,
    /// IDR is entered, CNY is derived as `idr / rate`.
    #[serde(rename = "primaryIsIDR")]
    PrimaryIsIdr,
}

impl LinkageMode {
    /// The currency that drives derivation.
    #[must_use]
    pub const fn primary(&self) -> Option<Currency> {
        match self {
            Self::None => None,
            Self::PrimaryIsCny => Some(Currency::Cny),
            Self::PrimaryIsIdr => Some(Currency::Idr),
        }
    }

    /// The currency that is derived.
    #[must_use]
    pub const fn secondary(&self) -> Option<Currency> {
        match self {
            Self::None => None,
            Self::PrimaryIsCny => Some(Currency::Idr),
            Self::PrimaryIsIdr => Some(Currency::Cny),
        }
    }

    /// Returns true if derivation is enabled.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// A derived amount does not fit in a `Decimal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Derived {currency} amount is out of range")]
pub struct LinkageOverflow {
    /// Currency whose amount could not be derived.
    pub currency: Currency,
}

/// Pure calculator for linked currency amounts.
///
/// `rate` is always IDR per 1 CNY, regardless of which side is primary.
pub struct CurrencyLinkageCalculator;

impl CurrencyLinkageCalculator {
    /// Derives the secondary amount from the primary one.
    ///
    /// Returns `None` when the mode is `None`, when `primary_currency` is not
    /// the mode's primary, when the rate is not positive, or when the result
    /// overflows.
    #[must_use]
    pub fn derive_amount(
        primary_currency: Currency,
        primary_amount: Decimal,
        rate: Decimal,
        mode: LinkageMode,
    ) -> Option<Decimal> {
        if rate <= Decimal::ZERO {
            return None;
        }

        match (mode, primary_currency) {
            (LinkageMode::PrimaryIsCny, Currency::Cny) => {
                convert_amount(primary_amount, rate, Currency::Idr)
            }
            (LinkageMode::PrimaryIsIdr, Currency::Idr) => {
                divide_amount(primary_amount, rate, Currency::Cny)
            }
            _ => None,
        }
    }

    /// Returns `amounts` with the secondary currency re-derived from the primary.
    ///
    /// Leaves `amounts` untouched when no derivation applies.
    ///
    /// # Errors
    ///
    /// Returns `LinkageOverflow` when a primary amount is present but the
    /// derived secondary amount does not fit in a `Decimal`.
    pub fn apply(
        amounts: &PriceAmounts,
        rate: Option<Decimal>,
        mode: LinkageMode,
    ) -> Result<PriceAmounts, LinkageOverflow> {
        let mut linked = amounts.clone();
        let (Some(primary), Some(secondary), Some(rate)) = (mode.primary(), mode.secondary(), rate)
        else {
            return Ok(linked);
        };
        if rate <= Decimal::ZERO {
            return Ok(linked);
        }

        if let Some(primary_amount) = amounts.get(primary) {
            let derived = Self::derive_amount(primary, primary_amount, rate, mode)
                .ok_or(LinkageOverflow { currency: secondary })?;
            linked.set(secondary, Some(derived));
        }
        Ok(linked)
    }
}

/// Interactive editor for a pair of linked currency fields.
#[derive(Debug, Clone)]
pub struct LinkedAmountEditor {
    mode: LinkageMode,
    rate: Option<Decimal>,
    amounts: PriceAmounts,
}

impl LinkedAmountEditor {
    /// Creates an editor over `amounts`.
    #[must_use]
    pub fn new(mode: LinkageMode, rate: Option<Decimal>, amounts: PriceAmounts) -> Self {
        let mut editor = Self {
            mode,
            rate,
            amounts,
        };
        editor.relink();
        editor
    }

    /// Sets a field. Only primary edits trigger derivation.
    pub fn edit(&mut self, currency: Currency, amount: Option<Decimal>) {
        self.amounts.set(currency, amount);
        if self.mode.primary() == Some(currency) {
            self.relink();
        }
    }

    /// Changes the rate and re-derives from the primary field.
    pub fn set_rate(&mut self, rate: Option<Decimal>) {
        self.rate = rate;
        self.relink();
    }

    /// Changes the linkage mode and re-derives from the new primary field.
    pub fn set_mode(&mut self, mode: LinkageMode) {
        self.mode = mode;
        self.relink();
    }

    // An out-of-range derivation blanks the secondary.
    fn relink(&mut self) {
        match CurrencyLinkageCalculator::apply(&self.amounts, self.rate, self.mode) {
            Ok(linked) => self.amounts = linked,
            Err(LinkageOverflow { currency }) => self.amounts.set(currency, None),
        }
    }

    /// Current field values.
    #[must_use]
    pub fn amounts(&self) -> &PriceAmounts {
        &self.amounts
    }

    /// Current linkage mode.
    #[must_use]
    pub fn mode(&self) -> LinkageMode {
        self.mode
    }

    /// Current exchange rate.
    #[must_use]
    pub fn rate(&self) -> Option<Decimal> {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(Currency::Cny, dec!(120), LinkageMode::PrimaryIsCny, Some(dec!(1848000)))]
    #[case(Currency::Idr, dec!(1848000), LinkageMode::PrimaryIsIdr, Some(dec!(120.00)))]
    #[case(Currency::Cny, dec!(120), LinkageMode::None, None)]
    #[case(Currency::Idr, dec!(1848000), LinkageMode::PrimaryIsCny, None)]
    #[case(Currency::Cny, dec!(120), LinkageMode::PrimaryIsIdr, None)]
    fn test_derive_amount(
        #[case] primary: Currency,
        #[case] amount: Decimal,
        #[case] mode: LinkageMode,
        #[case] expected: Option<Decimal>,
    ) {
        assert_eq!(
            CurrencyLinkageCalculator::derive_amount(primary, amount, dec!(15400), mode),
            expected
        );
    }

    #[test]
    fn test_derive_idr_rounds_to_whole_units() {
        // 99.99 * 15400.7 = 1,539,915.99... -> 1,539,916
        let derived = CurrencyLinkageCalculator::derive_amount(
            Currency::Cny,
            dec!(99.99),
            dec!(15400.7),
            LinkageMode::PrimaryIsCny,
        );
        assert_eq!(derived, Some(dec!(1539916)));
    }

    #[test]
    fn test_derive_with_non_positive_rate() {
        assert_eq!(
            CurrencyLinkageCalculator::derive_amount(
                Currency::Idr,
                dec!(1000),
                Decimal::ZERO,
                LinkageMode::PrimaryIsIdr
            ),
            None
        );
    }

    #[test]
    fn test_apply_overwrites_secondary() {
        let amounts = PriceAmounts::new()
            .with(Currency::Cny, dec!(120))
            .with(Currency::Idr, dec!(1));
        let rate = Some(dec!(15400));
        let linked =
            CurrencyLinkageCalculator::apply(&amounts, rate, LinkageMode::PrimaryIsCny).unwrap();
        assert_eq!(linked.get(Currency::Idr), Some(dec!(1848000)));
        assert_eq!(linked.get(Currency::Cny), Some(dec!(120)));
    }

    #[test]
    fn test_apply_without_rate_is_noop() {
        let amounts = PriceAmounts::new().with(Currency::Cny, dec!(120));
        let linked = CurrencyLinkageCalculator::apply(&amounts, None, LinkageMode::PrimaryIsCny);
        assert_eq!(linked, Ok(amounts));
    }

    #[test]
    fn test_apply_rejects_out_of_range_derivation() {
        let amounts = PriceAmounts::new().with(Currency::Cny, dec!(10000000000000000000000000));
        let rate = Some(dec!(15400));
        let result = CurrencyLinkageCalculator::apply(&amounts, rate, LinkageMode::PrimaryIsCny);
        assert_eq!(
            result,
            Err(LinkageOverflow {
                currency: Currency::Idr
            })
        );
    }

    #[test]
    fn test_editor_clears_secondary_on_out_of_range_edit() {
        let mut editor = LinkedAmountEditor::new(
            LinkageMode::PrimaryIsCny,
            Some(dec!(15400)),
            PriceAmounts::new().with(Currency::Cny, dec!(100)),
        );
        assert_eq!(editor.amounts().get(Currency::Idr), Some(dec!(1540000)));

        editor.edit(Currency::Cny, Some(dec!(10000000000000000000000000)));
        assert_eq!(editor.amounts().get(Currency::Idr), None);
        assert_eq!(
            editor.amounts().get(Currency::Cny),
            Some(dec!(10000000000000000000000000))
        );
    }

    #[test]
    fn test_editor_primary_edit_derives_secondary() {
        let mut editor = LinkedAmountEditor::new(
            LinkageMode::PrimaryIsCny,
            Some(dec!(15400)),
            PriceAmounts::new(),
        );
        editor.edit(Currency::Cny, Some(dec!(100)));
        assert_eq!(editor.amounts().get(Currency::Idr), Some(dec!(1540000)));
    }

    #[test]
    fn test_editor_secondary_edit_never_feeds_back() {
        let mut editor = LinkedAmountEditor::new(
            LinkageMode::PrimaryIsCny,
            Some(dec!(15400)),
            PriceAmounts::new().with(Currency::Cny, dec!(100)),
        );
        editor.edit(Currency::Idr, Some(dec!(2000000)));

        assert_eq!(editor.amounts().get(Currency::Cny), Some(dec!(100)));
        assert_eq!(editor.amounts().get(Currency::Idr), Some(dec!(2000000)));
    }

    #[test]
    fn test_editor_rate_change_rederives() {
        let mut editor = LinkedAmountEditor::new(
            LinkageMode::PrimaryIsIdr,
            Some(dec!(15400)),
            PriceAmounts::new().with(Currency::Idr, dec!(1540000)),
        );
        assert_eq!(editor.amounts().get(Currency::Cny), Some(dec!(100.00)));

        editor.set_rate(Some(dec!(15000)));
        assert_eq!(editor.amounts().get(Currency::Cny), Some(dec!(102.67)));
    }

    #[test]
    fn test_linkage_mode_wire_names() {
        assert_eq!(
            serde_json::to_string(&LinkageMode::PrimaryIsCny).unwrap(),
            "\"primaryIsCNY\""
        );
        let mode: LinkageMode = serde_json::from_str("\"primaryIsIDR\"").unwrap();
        assert_eq!(mode, LinkageMode::PrimaryIsIdr);
    }
}

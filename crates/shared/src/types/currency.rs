//! Currencies a price can be quoted in.
//!
//! Amounts are always `rust_decimal::Decimal` in major units. Never use
//! floating-point for prices.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// ISO 4217 currency codes supported by the price book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Chinese Yuan Renminbi
    Cny,
    /// Indonesian Rupiah
    Idr,
    /// US Dollar
    Usd,
    /// Euro
    Eur,
}

impl Currency {
    /// All supported currencies.
    pub const ALL: [Self; 4] = [Self::Cny, Self::Idr, Self::Usd, Self::Eur];

    /// Returns the 3-letter code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Cny => "CNY",
            Self::Idr => "IDR",
            Self::Usd => "USD",
            Self::Eur => "EUR",
        }
    }

    /// Number of minor-unit digits. IDR has no minor unit in practice.
    #[must_use]
    pub const fn decimal_places(&self) -> u32 {
        match self {
            Self::Idr => 0,
            Self::Cny | Self::Usd | Self::Eur => 2,
        }
    }

    /// Rounds an amount to this currency's minor units, half to even.
    #[must_use]
    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.decimal_places(), RoundingStrategy::MidpointNearestEven)
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown currency: {s}"))
    }
}

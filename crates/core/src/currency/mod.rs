//! Multi-currency handling and exchange rates.

pub mod conversion;
pub mod exchange;
pub mod linkage;
pub mod provider;

#[cfg(test)]
mod props;

pub use conversion::{convert_amount, divide_amount};
pub use exchange::{ExchangeRateRecord, RateLookup, RateLookupMethod, find_rate};
pub use linkage::{CurrencyLinkageCalculator, LinkageMode, LinkageOverflow, LinkedAmountEditor};
pub use provider::{ExchangeRateProvider, InMemoryRateProvider, RateError};

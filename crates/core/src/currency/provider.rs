//! Exchange rate provider interface and the in-memory adapter.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricebook_shared::types::Currency;
use rust_decimal::Decimal;
use thiserror::Error;

use super::conversion::convert_amount;
use super::exchange::{ExchangeRateRecord, find_rate};

/// Errors raised by exchange rate providers.
#[derive(Debug, Error)]
pub enum RateError {
    /// No applicable rate for the pair at the requested instant.
    #[error("No exchange rate found for {from}/{to} as of {as_of}")]
    NotFound {
        /// Source currency.
        from: Currency,
        /// Target currency.
        to: Currency,
        /// Instant of the lookup.
        as_of: DateTime<Utc>,
    },

    /// Rate must be positive.
    #[error("Exchange rate must be positive, got {0}")]
    NonPositiveRate(Decimal),

    /// The converted amount does not fit in a `Decimal`.
    #[error("Converted {to} amount is out of range")]
    OutOfRange {
        /// Target currency.
        to: Currency,
    },

    /// The backing store failed.
    #[error("Exchange rate backend error: {0}")]
    Backend(String),
}

/// Supplies conversion rates between currencies, valid as of a given instant.
#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    /// Returns units of `to` per 1 unit of `from`, valid at `as_of`.
    async fn get_rate(
        &self,
        from: Currency,
        to: Currency,
        as_of: DateTime<Utc>,
    ) -> Result<Decimal, RateError>;

    /// Converts `amount` from one currency into another.
    ///
    /// Rounds to the target currency's minor units. Never substitutes a 1:1
    /// rate for a missing one: `NotFound` propagates to the caller. A product
    /// past `Decimal::MAX` is `OutOfRange`.
    async fn convert(
        &self,
        amount: Decimal,
        from: Currency,
        to: Currency,
        as_of: DateTime<Utc>,
    ) -> Result<Decimal, RateError> {
        if from == to {
            return Ok(amount);
        }
        let rate = self.get_rate(from, to, as_of).await?;
        convert_amount(amount, rate, to).ok_or(RateError::OutOfRange { to })
    }
}

/// Exchange rate provider backed by an in-process rate table.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRateProvider {
    records: Arc<RwLock<Vec<ExchangeRateRecord>>>,
}

impl InMemoryRateProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider preloaded with `records`.
    #[must_use]
    pub fn from_records(records: Vec<ExchangeRateRecord>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    /// Adds a rate record.
    pub fn add(&self, record: ExchangeRateRecord) -> Result<(), RateError> {
        if record.rate <= Decimal::ZERO {
            return Err(RateError::NonPositiveRate(record.rate));
        }
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }
}

#[async_trait]
impl ExchangeRateProvider for InMemoryRateProvider {
    async fn get_rate(
        &self,
        from: Currency,
        to: Currency,
        as_of: DateTime<Utc>,
    ) -> Result<Decimal, RateError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        find_rate(&records, from, to, as_of)
            .map(|lookup| lookup.rate)
            .ok_or(RateError::NotFound { from, to, as_of })
    }
}

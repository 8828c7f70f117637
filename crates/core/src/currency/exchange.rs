//! Exchange rate types and lookup logic.

use chrono::{DateTime, Utc};
use pricebook_shared::types::{Currency, ExchangeRateId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Exchange rate between two currencies over an effective window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRateRecord {
    /// Record identifier.
    pub id: ExchangeRateId,
    /// Source currency code.
    pub from_currency: Currency,
    /// Target currency code.
    pub to_currency: Currency,
    /// Exchange rate (1 from_currency = rate to_currency).
    pub rate: Decimal,
    /// First instant this rate applies (inclusive).
    pub effective_from: DateTime<Utc>,
    /// Instant this rate stops applying (exclusive), open-ended if `None`.
    pub effective_to: Option<DateTime<Utc>>,
    /// Only approved rates take part in lookups.
    pub approved: bool,
}

impl ExchangeRateRecord {
    /// Creates a new approved, open-ended exchange rate.
    #[must_use]
    pub fn new(
        from_currency: Currency,
        to_currency: Currency,
        rate: Decimal,
        effective_from: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ExchangeRateId::new(),
            from_currency,
            to_currency,
            rate,
            effective_from,
            effective_to: None,
            approved: true,
        }
    }

    /// Closes the rate at `effective_to`.
    #[must_use]
    pub fn until(mut self, effective_to: DateTime<Utc>) -> Self {
        self.effective_to = Some(effective_to);
        self
    }

    /// Marks the rate as awaiting approval.
    #[must_use]
    pub fn unapproved(mut self) -> Self {
        self.approved = false;
        self
    }

    /// Returns true if the rate is approved and its window contains `as_of`.
    #[must_use]
    pub fn applies_at(&self, as_of: DateTime<Utc>) -> bool {
        self.approved
            && self.effective_from <= as_of
            && self.effective_to.is_none_or(|to| as_of < to)
    }

    /// Returns the inverse rate.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            id: self.id,
            from_currency: self.to_currency,
            to_currency: self.from_currency,
            rate: Decimal::ONE / self.rate,
            effective_from: self.effective_from,
            effective_to: self.effective_to,
            approved: self.approved,
        }
    }
}

/// Result of an exchange rate lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLookup {
    /// The exchange rate.
    pub rate: Decimal,
    /// How the rate was obtained.
    pub method: RateLookupMethod,
}

/// How an exchange rate was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLookupMethod {
    /// Same currency on both sides.
    Identity,
    /// Direct rate found (from_currency -> to_currency).
    Direct,
    /// Inverse rate calculated (to_currency -> from_currency, then inverted).
    Inverse,
}

/// Finds the rate for a currency pair valid at `as_of`.
///
/// Lookup priority:
/// 1. Same currency = rate of 1
/// 2. Direct rate (from_currency -> to_currency)
/// 3. Inverse rate (to_currency -> from_currency, then invert)
///
/// Among applicable records the one with the latest `effective_from` wins.
#[must_use]
pub fn find_rate(
    records: &[ExchangeRateRecord],
    from_currency: Currency,
    to_currency: Currency,
    as_of: DateTime<Utc>,
) -> Option<RateLookup> {
    if from_currency == to_currency {
        return Some(RateLookup {
            rate: Decimal::ONE,
            method: RateLookupMethod::Identity,
        });
    }

    if let Some(direct) = find_best_record(records, from_currency, to_currency, as_of) {
        return Some(RateLookup {
            rate: direct.rate,
            method: RateLookupMethod::Direct,
        });
    }

    find_best_record(records, to_currency, from_currency, as_of)
        .filter(|inverse| !inverse.rate.is_zero())
        .map(|inverse| RateLookup {
            rate: inverse.inverse().rate,
            method: RateLookupMethod::Inverse,
        })
}

/// Finds the most recent applicable record for an exact pair.
fn find_best_record(
    records: &[ExchangeRateRecord],
    from_currency: Currency,
    to_currency: Currency,
    as_of: DateTime<Utc>,
) -> Option<&ExchangeRateRecord> {
    records
        .iter()
        .filter(|r| {
            r.from_currency == from_currency && r.to_currency == to_currency && r.applies_at(as_of)
        })
        .max_by_key(|r| r.effective_from)
}

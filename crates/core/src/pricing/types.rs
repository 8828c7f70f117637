//! Price versioning domain types.
//!
//! A `PriceRecord` is one effective-dated price fact for a subject and tier.
//! Its lifecycle state is always derived from its window and the clock,
//! never stored.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use pricebook_shared::types::{Currency, OrganizationId, PriceRecordId, ProductId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pricing::error::PricingError;

/// Price category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceTier {
    /// Internal cost price.
    Cost,
    /// Price offered to channel partners.
    Channel,
    /// Price offered to direct customers.
    Direct,
    /// Published list price.
    List,
}

impl PriceTier {
    /// All tiers.
    pub const ALL: [Self; 4] = [Self::Cost, Self::Channel, Self::Direct, Self::List];

    /// Returns the string representation of the tier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cost => "cost",
            Self::Channel => "channel",
            Self::Direct => "direct",
            Self::List => "list",
        }
    }

    /// Parses a tier from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cost" => Some(Self::Cost),
            "channel" => Some(Self::Channel),
            "direct" => Some(Self::Direct),
            "list" => Some(Self::List),
            _ => None,
        }
    }
}

impl fmt::Display for PriceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies whose price is being versioned: a product, optionally scoped to
/// one organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectKey {
    /// The product.
    pub product_id: ProductId,
    /// Organization-specific override, if any.
    pub organization_id: Option<OrganizationId>,
}

impl SubjectKey {
    /// Catalog-wide price subject for a product.
    #[must_use]
    pub const fn product(product_id: ProductId) -> Self {
        Self {
            product_id,
            organization_id: None,
        }
    }

    /// Organization-specific price subject for a product.
    #[must_use]
    pub const fn for_organization(product_id: ProductId, organization_id: OrganizationId) -> Self {
        Self {
            product_id,
            organization_id: Some(organization_id),
        }
    }

    /// Rejects nil identifiers.
    pub fn validate(&self) -> Result<(), PricingError> {
        if self.product_id.is_nil() {
            return Err(PricingError::InvalidSubjectKey(
                "product id must not be nil".to_string(),
            ));
        }
        if self.organization_id.is_some_and(|org| org.is_nil()) {
            return Err(PricingError::InvalidSubjectKey(
                "organization id must not be nil".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses `<product>` or `<product>:<organization>`.
    pub fn parse(s: &str) -> Result<Self, PricingError> {
        let invalid = || PricingError::InvalidSubjectKey(s.to_string());

        let mut parts = s.trim().split(':');
        let product = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let product_id = Uuid::parse_str(product).map_err(|_| invalid())?;

        let organization_id = match parts.next() {
            None => None,
            Some(org) => Some(Uuid::parse_str(org).map_err(|_| invalid())?),
        };
        if parts.next().is_some() {
            return Err(invalid());
        }

        let key = Self {
            product_id: ProductId::from_uuid(product_id),
            organization_id: organization_id.map(OrganizationId::from_uuid),
        };
        key.validate()?;
        Ok(key)
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.organization_id {
            Some(org) => write!(f, "{}:{}", self.product_id, org),
            None => write!(f, "{}", self.product_id),
        }
    }
}

/// Per-currency amounts of one price version. A `None` value means the
/// currency is not priced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceAmounts(BTreeMap<Currency, Option<Decimal>>);

impl PriceAmounts {
    /// Creates an empty amount set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    #[must_use]
    pub fn with(mut self, currency: Currency, amount: Decimal) -> Self {
        self.0.insert(currency, Some(amount));
        self
    }

    /// Returns the amount for `currency`, if priced.
    #[must_use]
    pub fn get(&self, currency: Currency) -> Option<Decimal> {
        self.0.get(&currency).copied().flatten()
    }

    /// Sets or clears the amount for `currency`.
    pub fn set(&mut self, currency: Currency, amount: Option<Decimal>) {
        self.0.insert(currency, amount);
    }

    /// Returns true if at least one currency carries a value.
    #[must_use]
    pub fn has_any_value(&self) -> bool {
        self.0.values().any(Option::is_some)
    }

    /// Currencies present in the set, valued or not.
    pub fn currencies(&self) -> impl Iterator<Item = Currency> + '_ {
        self.0.keys().copied()
    }

    /// Iterates over `(currency, amount)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Currency, Option<Decimal>)> + '_ {
        self.0.iter().map(|(currency, amount)| (*currency, *amount))
    }

    /// Returns the first negative amount, if any.
    #[must_use]
    pub fn first_negative(&self) -> Option<(Currency, Decimal)> {
        self.iter().find_map(|(currency, amount)| {
            amount
                .filter(|a| a.is_sign_negative() && !a.is_zero())
                .map(|a| (currency, a))
        })
    }

    /// Rounds every amount to its currency's minor units.
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self(
            self.0
                .iter()
                .map(|(currency, amount)| (*currency, amount.map(|a| currency.round(a))))
                .collect(),
        )
    }
}

impl FromIterator<(Currency, Option<Decimal>)> for PriceAmounts {
    fn from_iter<I: IntoIterator<Item = (Currency, Option<Decimal>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Where a price version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Entered by a user in the dashboard.
    #[default]
    Manual,
    /// Bulk import.
    Import,
    /// Programmatic API client.
    Api,
    /// Flat price carried over from the parent entity.
    Legacy,
}

impl PriceSource {
    /// Returns the string representation of the source.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Import => "import",
            Self::Api => "api",
            Self::Legacy => "legacy",
        }
    }

    /// Parses a source from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "import" => Some(Self::Import),
            "api" => Some(Self::Api),
            "legacy" => Some(Self::Legacy),
            _ => None,
        }
    }
}

/// Half-open validity interval `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveWindow {
    /// Inclusive lower bound.
    pub from: DateTime<Utc>,
    /// Exclusive upper bound, open-ended if `None`.
    pub to: Option<DateTime<Utc>>,
}

impl EffectiveWindow {
    /// Returns true if `at` falls inside the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && self.to.is_none_or(|to| at < to)
    }

    /// Returns true if the two windows share at least one instant.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let self_ends_after = self.to.is_none_or(|to| other.from < to);
        let other_ends_after = other.to.is_none_or(|to| self.from < to);
        self_ends_after && other_ends_after
    }
}

/// Lifecycle state of a price record, derived from its window and the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceState {
    /// Scheduled; starts in the future. Editable and deletable.
    Pending,
    /// In effect now.
    Active,
    /// Ended and replaced by a later record.
    Superseded,
    /// Ended with nothing scheduled after it.
    Expired,
}

impl PriceState {
    /// Returns true if the record may still be edited or deleted.
    #[must_use]
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl fmt::Display for PriceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Superseded => "superseded",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// One versioned price fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Record identifier.
    pub id: PriceRecordId,
    /// Whose price this is.
    pub subject: SubjectKey,
    /// Price category.
    pub tier: PriceTier,
    /// Per-currency amounts; at least one is valued.
    pub amounts: PriceAmounts,
    /// IDR per 1 CNY used at entry time.
    pub exchange_rate: Option<Decimal>,
    /// Inclusive lower bound.
    pub effective_from: DateTime<Utc>,
    /// Exclusive upper bound, open-ended if `None`.
    pub effective_to: Option<DateTime<Utc>>,
    /// Provenance.
    pub source: PriceSource,
    /// Why the price was set.
    pub change_reason: Option<String>,
    /// Who set the price.
    pub changed_by: Option<UserId>,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
}

impl PriceRecord {
    /// Synthesizes the record used when a subject has no versioned history:
    /// the legacy flat amounts, effective since the epoch and open-ended.
    #[must_use]
    pub fn fallback(subject: SubjectKey, tier: PriceTier, amounts: PriceAmounts) -> Self {
        Self {
            id: PriceRecordId::from_uuid(Uuid::nil()),
            subject,
            tier,
            amounts,
            exchange_rate: None,
            effective_from: DateTime::<Utc>::UNIX_EPOCH,
            effective_to: None,
            source: PriceSource::Legacy,
            change_reason: None,
            changed_by: None,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// The record's validity interval.
    #[must_use]
    pub fn window(&self) -> EffectiveWindow {
        EffectiveWindow {
            from: self.effective_from,
            to: self.effective_to,
        }
    }

    /// Returns true if this record belongs to `(subject, tier)`.
    #[must_use]
    pub fn belongs_to(&self, subject: &SubjectKey, tier: PriceTier) -> bool {
        self.subject == *subject && self.tier == tier
    }

    /// Returns true if the record has started by `now`.
    #[must_use]
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.effective_from <= now
    }

    /// Returns true if this is the open-ended future record.
    #[must_use]
    pub fn is_pending(&self, now: DateTime<Utc>) -> bool {
        self.effective_from > now && self.effective_to.is_none()
    }

    /// Returns true if the record is in effect at `at`.
    #[must_use]
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.window().contains(at)
    }

    /// Derives the lifecycle state.
    ///
    /// `has_successor` tells an ended record apart: superseded if a later
    /// record exists, expired otherwise.
    #[must_use]
    pub fn state(&self, now: DateTime<Utc>, has_successor: bool) -> PriceState {
        if self.effective_from > now {
            PriceState::Pending
        } else if self.is_active_at(now) {
            PriceState::Active
        } else if has_successor {
            PriceState::Superseded
        } else {
            PriceState::Expired
        }
    }
}

/// What is in effect for a subject and tier at an instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPrice {
    /// Record in effect, if any.
    pub current: Option<PriceRecord>,
    /// Open-ended record that starts later, if any.
    pub pending: Option<PriceRecord>,
}

impl ResolvedPrice {
    /// Returns true if neither a current nor a pending record exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.pending.is_none()
    }
}

//! Immutable audit trail of price changes.
//!
//! One entry is emitted per `(tier, currency)` pair whose amount or
//! effective window changed across a mutation.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use pricebook_shared::types::{
    ChangeLogId, Currency, PageRequest, PageResponse, PriceRecordId, UserId,
};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::types::{EffectiveWindow, PriceRecord, PriceTier, SubjectKey};

/// Decimal places kept on delta percentages.
const PERCENTAGE_DP: u32 = 2;

/// Kind of mutation that produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// A pending record was scheduled.
    Create,
    /// A pending record was edited.
    Update,
    /// A pending record was removed.
    Delete,
    /// A scheduled close-out was cancelled.
    Activate,
    /// An active record was scheduled to close.
    Deactivate,
}

impl ChangeType {
    /// Returns the string representation of the change type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
        }
    }

    /// Parses a change type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "activate" => Some(Self::Activate),
            "deactivate" => Some(Self::Deactivate),
            _ => None,
        }
    }
}

/// Write-once audit entry for one `(tier, currency)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Entry identifier.
    pub id: ChangeLogId,
    /// Record the change applies to.
    pub price_record_id: PriceRecordId,
    /// Whose price changed.
    pub subject: SubjectKey,
    /// Price category.
    pub tier: PriceTier,
    /// Currency of the amounts.
    pub currency: Currency,
    /// Kind of mutation.
    pub change_type: ChangeType,
    /// Amount before the change.
    pub old_amount: Option<Decimal>,
    /// Amount after the change.
    pub new_amount: Option<Decimal>,
    /// `new - old`, with a missing side counted as zero.
    pub delta: Decimal,
    /// `delta / old * 100`; `None` when the old amount is missing or zero.
    pub delta_percentage: Option<Decimal>,
    /// Effective window before the change.
    pub old_window: Option<EffectiveWindow>,
    /// Effective window after the change.
    pub new_window: Option<EffectiveWindow>,
    /// Why the change was made.
    pub reason: Option<String>,
    /// Who made the change.
    pub changed_by: Option<UserId>,
    /// When the change was accepted.
    pub changed_at: DateTime<Utc>,
}

/// Provenance shared by every entry of one mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeContext {
    /// Why the change was made.
    pub reason: Option<String>,
    /// Who made the change.
    pub changed_by: Option<UserId>,
    /// When the change was accepted.
    pub changed_at: DateTime<Utc>,
}

/// Filters for change log retrieval. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogFilter {
    /// Restrict to one tier.
    pub tier: Option<PriceTier>,
    /// Restrict to one currency.
    pub currency: Option<Currency>,
    /// Restrict to one change type.
    pub change_type: Option<ChangeType>,
    /// Restrict to one actor.
    pub changed_by: Option<UserId>,
    /// Inclusive lower bound on `changed_at`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `changed_at`.
    pub to: Option<DateTime<Utc>>,
}

impl ChangeLogFilter {
    /// Returns true if `entry` passes every set criterion.
    #[must_use]
    pub fn matches(&self, entry: &ChangeLogEntry) -> bool {
        self.tier.is_none_or(|t| entry.tier == t)
            && self.currency.is_none_or(|c| entry.currency == c)
            && self.change_type.is_none_or(|ct| entry.change_type == ct)
            && self.changed_by.is_none_or(|u| entry.changed_by == Some(u))
            && self.from.is_none_or(|from| entry.changed_at >= from)
            && self.to.is_none_or(|to| entry.changed_at < to)
    }
}

/// Derives and orders change log entries.
pub struct ChangeLogRecorder;

impl ChangeLogRecorder {
    /// Emits one entry per currency whose amount or window differs between
    /// `before` and `after`.
    ///
    /// Currencies valued on neither side are skipped. Returns no entries
    /// when both sides are `None`.
    #[must_use]
    pub fn diff(
        before: Option<&PriceRecord>,
        after: Option<&PriceRecord>,
        change_type: ChangeType,
        ctx: &ChangeContext,
    ) -> Vec<ChangeLogEntry> {
        let Some(anchor) = after.or(before) else {
            return Vec::new();
        };

        let old_window = before.map(PriceRecord::window);
        let new_window = after.map(PriceRecord::window);
        let window_changed = old_window != new_window;

        let currencies: BTreeSet<Currency> = before
            .into_iter()
            .chain(after)
            .flat_map(|r| r.amounts.currencies())
            .collect();

        currencies
            .into_iter()
            .filter_map(|currency| {
                let old_amount = before.and_then(|r| r.amounts.get(currency));
                let new_amount = after.and_then(|r| r.amounts.get(currency));
                if old_amount.is_none() && new_amount.is_none() {
                    return None;
                }
                if old_amount == new_amount && !window_changed {
                    return None;
                }

                let delta = new_amount.unwrap_or_default() - old_amount.unwrap_or_default();
                Some(ChangeLogEntry {
                    id: ChangeLogId::new(),
                    price_record_id: anchor.id,
                    subject: anchor.subject,
                    tier: anchor.tier,
                    currency,
                    change_type,
                    old_amount,
                    new_amount,
                    delta,
                    delta_percentage: Self::delta_percentage(old_amount, delta),
                    old_window,
                    new_window,
                    reason: ctx.reason.clone(),
                    changed_by: ctx.changed_by,
                    changed_at: ctx.changed_at,
                })
            })
            .collect()
    }

    /// `delta / old * 100`, rounded to two places; `None` for a missing or
    /// zero base.
    #[must_use]
    pub fn delta_percentage(old_amount: Option<Decimal>, delta: Decimal) -> Option<Decimal> {
        let old = old_amount.filter(|old| !old.is_zero())?;
        delta
            .checked_div(old)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .map(|pct| {
                pct.round_dp_with_strategy(PERCENTAGE_DP, RoundingStrategy::MidpointNearestEven)
            })
    }

    /// Filters a subject's entries and returns one page, newest first.
    ///
    /// Ties on `changed_at` are broken by id, newest first.
    #[must_use]
    pub fn query<'a, I>(
        entries: I,
        subject: &SubjectKey,
        filter: &ChangeLogFilter,
        page: &PageRequest,
    ) -> PageResponse<ChangeLogEntry>
    where
        I: IntoIterator<Item = &'a ChangeLogEntry>,
    {
        let mut matching: Vec<ChangeLogEntry> = entries
            .into_iter()
            .filter(|e| e.subject == *subject && filter.matches(e))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.changed_at.cmp(&a.changed_at).then_with(|| b.id.cmp(&a.id)));

        PageResponse::slice(matching, page)
    }
}

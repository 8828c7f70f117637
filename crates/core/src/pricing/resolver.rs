//! Temporal resolution of versioned price records.
//!
//! All functions here are pure over a record slice and an instant. Records
//! belonging to other subjects or tiers are ignored, so callers may pass a
//! whole table.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use pricebook_shared::types::PriceRecordId;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::types::{PriceAmounts, PriceRecord, PriceState, PriceTier, ResolvedPrice, SubjectKey};

/// A broken record-set invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// Two started records share an instant.
    Overlap {
        /// Subject.
        subject: SubjectKey,
        /// Tier.
        tier: PriceTier,
        /// Earlier record.
        first: PriceRecordId,
        /// Later record.
        second: PriceRecordId,
    },
    /// More than one open-ended future record.
    MultiplePending {
        /// Subject.
        subject: SubjectKey,
        /// Tier.
        tier: PriceTier,
        /// The pending records.
        ids: Vec<PriceRecordId>,
    },
    /// `effective_from >= effective_to`.
    InvertedInterval {
        /// The record.
        id: PriceRecordId,
    },
    /// No currency carries a value.
    EmptyAmounts {
        /// The record.
        id: PriceRecordId,
    },
}

/// One subject/tier to resolve in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    /// Subject.
    pub subject: SubjectKey,
    /// Tier.
    pub tier: PriceTier,
    /// Legacy flat amounts used when the subject has no history.
    pub fallback: Option<PriceAmounts>,
}

/// Resolves which price record is in effect at an instant.
pub struct TemporalResolver;

impl TemporalResolver {
    /// Returns the record in effect at `as_of` and the pending record, if any.
    ///
    /// When the subject has no versioned history for `tier`, `fallback`
    /// amounts resolve as an open-ended record effective since the epoch.
    /// A subject with neither resolves to an empty result.
    #[must_use]
    pub fn resolve_at(
        records: &[PriceRecord],
        subject: &SubjectKey,
        tier: PriceTier,
        as_of: DateTime<Utc>,
        fallback: Option<&PriceAmounts>,
    ) -> ResolvedPrice {
        let mut history = records.iter().filter(|r| r.belongs_to(subject, tier)).peekable();

        if history.peek().is_none() {
            let current = fallback
                .filter(|amounts| amounts.has_any_value())
                .map(|amounts| PriceRecord::fallback(*subject, tier, amounts.clone()));
            return ResolvedPrice {
                current,
                pending: None,
            };
        }

        let mut current: Option<&PriceRecord> = None;
        let mut pending: Option<&PriceRecord> = None;

        for record in history {
            if record.has_started(as_of) {
                // Latest start wins if intervals were ever corrupted.
                if record.is_active_at(as_of)
                    && current.is_none_or(|c| record.effective_from > c.effective_from)
                {
                    current = Some(record);
                }
            } else if record.effective_to.is_none()
                && pending.is_none_or(|p| record.effective_from < p.effective_from)
            {
                pending = Some(record);
            }
        }

        ResolvedPrice {
            current: current.cloned(),
            pending: pending.cloned(),
        }
    }

    /// Derives the lifecycle state of `record` among its siblings.
    #[must_use]
    pub fn state_of(
        record: &PriceRecord,
        siblings: &[PriceRecord],
        now: DateTime<Utc>,
    ) -> PriceState {
        let has_successor = record.effective_to.is_some_and(|end| {
            siblings.iter().any(|other| {
                other.id != record.id
                    && other.belongs_to(&record.subject, record.tier)
                    && other.effective_from >= end
            })
        });
        record.state(now, has_successor)
    }

    /// Returns the open-ended future record for `(subject, tier)`, if any.
    #[must_use]
    pub fn pending_of<'a>(
        records: &'a [PriceRecord],
        subject: &SubjectKey,
        tier: PriceTier,
        now: DateTime<Utc>,
    ) -> Option<&'a PriceRecord> {
        records
            .iter()
            .filter(|r| r.belongs_to(subject, tier) && r.is_pending(now))
            .min_by_key(|r| r.effective_from)
    }

    /// Returns the started record with the latest start strictly before
    /// `before`, excluding `exclude`.
    #[must_use]
    pub fn predecessor_of<'a>(
        records: &'a [PriceRecord],
        subject: &SubjectKey,
        tier: PriceTier,
        before: DateTime<Utc>,
        exclude: Option<PriceRecordId>,
    ) -> Option<&'a PriceRecord> {
        records
            .iter()
            .filter(|r| {
                r.belongs_to(subject, tier)
                    && Some(r.id) != exclude
                    && r.effective_from < before
            })
            .max_by_key(|r| r.effective_from)
    }

    /// Checks the record-set invariants as of `now`.
    ///
    /// Returns every violation found; an empty vector means the set is sound.
    #[must_use]
    pub fn check_invariants(
        records: &[PriceRecord],
        now: DateTime<Utc>,
    ) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();
        let mut groups: BTreeMap<(SubjectKey, PriceTier), Vec<&PriceRecord>> = BTreeMap::new();

        for record in records {
            if record.effective_to.is_some_and(|to| record.effective_from >= to) {
                violations.push(InvariantViolation::InvertedInterval { id: record.id });
            }
            if !record.amounts.has_any_value() {
                violations.push(InvariantViolation::EmptyAmounts { id: record.id });
            }
            groups.entry((record.subject, record.tier)).or_default().push(record);
        }

        for ((subject, tier), mut group) in groups {
            let pending: Vec<PriceRecordId> = group
                .iter()
                .filter(|r| r.is_pending(now))
                .map(|r| r.id)
                .collect();
            if pending.len() > 1 {
                violations.push(InvariantViolation::MultiplePending {
                    subject,
                    tier,
                    ids: pending,
                });
            }

            group.retain(|r| r.has_started(now));
            group.sort_by_key(|r| r.effective_from);
            for (i, first) in group.iter().enumerate() {
                for second in &group[i + 1..] {
                    if first.window().overlaps(&second.window()) {
                        violations.push(InvariantViolation::Overlap {
                            subject,
                            tier,
                            first: first.id,
                            second: second.id,
                        });
                    }
                }
            }
        }

        violations
    }

    /// Resolves many subjects at once.
    ///
    /// Results are returned in request order.
    #[must_use]
    pub fn resolve_batch(
        records: &[PriceRecord],
        requests: &[ResolveRequest],
        as_of: DateTime<Utc>,
    ) -> Vec<ResolvedPrice> {
        requests
            .par_iter()
            .map(|req| {
                Self::resolve_at(records, &req.subject, req.tier, as_of, req.fallback.as_ref())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pricebook_shared::types::{Currency, ProductId};
    use rust_decimal_macros::dec;

    use crate::pricing::types::PriceSource;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn record(
        subject: SubjectKey,
        cny: rust_decimal::Decimal,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> PriceRecord {
        PriceRecord {
            id: PriceRecordId::new(),
            subject,
            tier: PriceTier::Channel,
            amounts: PriceAmounts::new().with(Currency::Cny, cny),
            exchange_rate: None,
            effective_from: from,
            effective_to: to,
            source: PriceSource::Manual,
            change_reason: None,
            changed_by: None,
            created_at: from,
        }
    }

    fn channel_at(
        records: &[PriceRecord],
        subject: &SubjectKey,
        as_of: DateTime<Utc>,
    ) -> ResolvedPrice {
        TemporalResolver::resolve_at(records, subject, PriceTier::Channel, as_of, None)
    }

    fn history() -> (SubjectKey, Vec<PriceRecord>) {
        let subject = SubjectKey::product(ProductId::new());
        let records = vec![
            record(subject, dec!(80), at(2023, 1, 1), Some(at(2024, 1, 1))),
            record(subject, dec!(100), at(2024, 1, 1), Some(at(2024, 6, 1))),
            record(subject, dec!(120), at(2024, 6, 1), None),
        ];
        (subject, records)
    }

    #[test]
    fn test_resolve_current_and_pending() {
        let (subject, records) = history();
        let resolved = channel_at(&records, &subject, at(2024, 3, 1));

        assert_eq!(resolved.current.unwrap().amounts.get(Currency::Cny), Some(dec!(100)));
        assert_eq!(resolved.pending.unwrap().amounts.get(Currency::Cny), Some(dec!(120)));
    }

    #[test]
    fn test_resolve_after_promotion() {
        let (subject, records) = history();
        let resolved = channel_at(&records, &subject, at(2024, 7, 1));

        assert_eq!(resolved.current.unwrap().amounts.get(Currency::Cny), Some(dec!(120)));
        assert!(resolved.pending.is_none());
    }

    #[test]
    fn test_resolve_exact_boundary_picks_successor() {
        let (subject, records) = history();
        let resolved = channel_at(&records, &subject, at(2024, 6, 1));
        assert_eq!(resolved.current.unwrap().amounts.get(Currency::Cny), Some(dec!(120)));
    }

    #[test]
    fn test_resolve_historical_instant() {
        let (subject, records) = history();
        let resolved = channel_at(&records, &subject, at(2023, 6, 1));
        assert_eq!(resolved.current.unwrap().amounts.get(Currency::Cny), Some(dec!(80)));
        // Only the open-ended record counts as pending; the closed
        // 2024-01-01 record does not.
        assert_eq!(resolved.pending.unwrap().amounts.get(Currency::Cny), Some(dec!(120)));
    }

    #[test]
    fn test_resolve_ignores_other_tiers_and_subjects() {
        let (subject, records) = history();
        let other = SubjectKey::product(ProductId::new());

        assert!(
            TemporalResolver::resolve_at(&records, &subject, PriceTier::List, at(2024, 3, 1), None)
                .is_empty()
        );
        assert!(
            TemporalResolver::resolve_at(&records, &other, PriceTier::Channel, at(2024, 3, 1), None)
                .is_empty()
        );
    }

    #[test]
    fn test_resolve_uses_fallback_without_history() {
        let subject = SubjectKey::product(ProductId::new());
        let fallback = PriceAmounts::new().with(Currency::Idr, dec!(500000));

        let resolved = TemporalResolver::resolve_at(
            &[],
            &subject,
            PriceTier::List,
            at(2024, 3, 1),
            Some(&fallback),
        );
        let current = resolved.current.unwrap();
        assert_eq!(current.amounts, fallback);
        assert_eq!(current.source, PriceSource::Legacy);
        assert!(resolved.pending.is_none());
    }

    #[test]
    fn test_fallback_ignored_when_history_exists() {
        let (subject, records) = history();
        let fallback = PriceAmounts::new().with(Currency::Cny, dec!(1));

        // Before the first record nothing is in effect, and the fallback
        // does not leak into a subject that has history.
        let resolved = TemporalResolver::resolve_at(
            &records,
            &subject,
            PriceTier::Channel,
            at(2022, 1, 1),
            Some(&fallback),
        );
        assert!(resolved.current.is_none());
    }

    #[test]
    fn test_empty_fallback_resolves_empty() {
        let subject = SubjectKey::product(ProductId::new());
        let resolved = TemporalResolver::resolve_at(
            &[],
            &subject,
            PriceTier::List,
            at(2024, 3, 1),
            Some(&PriceAmounts::new()),
        );
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_state_of() {
        let (_, records) = history();
        let now = at(2024, 3, 1);
        assert_eq!(TemporalResolver::state_of(&records[0], &records, now), PriceState::Superseded);
        assert_eq!(TemporalResolver::state_of(&records[1], &records, now), PriceState::Active);
        assert_eq!(TemporalResolver::state_of(&records[2], &records, now), PriceState::Pending);
    }

    #[test]
    fn test_state_of_expired_without_successor() {
        let subject = SubjectKey::product(ProductId::new());
        let records = vec![record(subject, dec!(100), at(2024, 1, 1), Some(at(2024, 2, 1)))];
        assert_eq!(
            TemporalResolver::state_of(&records[0], &records, at(2024, 3, 1)),
            PriceState::Expired
        );
    }

    #[test]
    fn test_check_invariants_clean_history() {
        let (_, records) = history();
        assert!(TemporalResolver::check_invariants(&records, at(2024, 3, 1)).is_empty());
    }

    #[test]
    fn test_check_invariants_reports_violations() {
        let subject = SubjectKey::product(ProductId::new());
        let mut empty = record(subject, dec!(1), at(2024, 1, 1), Some(at(2024, 3, 1)));
        empty.amounts = PriceAmounts::new();
        let records = vec![
            empty,
            record(subject, dec!(2), at(2024, 2, 1), Some(at(2024, 4, 1))),
            record(subject, dec!(3), at(2024, 9, 1), None),
            record(subject, dec!(4), at(2024, 10, 1), None),
            record(subject, dec!(5), at(2024, 5, 1), Some(at(2024, 5, 1))),
        ];

        let violations = TemporalResolver::check_invariants(&records, at(2024, 6, 1));
        assert!(violations.contains(&InvariantViolation::EmptyAmounts { id: records[0].id }));
        assert!(violations.contains(&InvariantViolation::InvertedInterval { id: records[4].id }));
        assert!(violations.iter().any(|v| matches!(
            v,
            InvariantViolation::Overlap { first, second, .. }
                if *first == records[0].id && *second == records[1].id
        )));
        assert!(violations.iter().any(|v| matches!(
            v,
            InvariantViolation::MultiplePending { ids, .. } if ids.len() == 2
        )));
    }

    #[test]
    fn test_resolve_batch_preserves_order() {
        let (subject, records) = history();
        let orphan = SubjectKey::product(ProductId::new());
        let requests = vec![
            ResolveRequest {
                subject: orphan,
                tier: PriceTier::Channel,
                fallback: Some(PriceAmounts::new().with(Currency::Cny, dec!(9))),
            },
            ResolveRequest {
                subject,
                tier: PriceTier::Channel,
                fallback: None,
            },
        ];

        let results = TemporalResolver::resolve_batch(&records, &requests, at(2024, 3, 1));
        assert_eq!(results.len(), 2);
        let cny = |i: usize| results[i].current.as_ref().unwrap().amounts.get(Currency::Cny);
        assert_eq!(cny(0), Some(dec!(9)));
        assert_eq!(cny(1), Some(dec!(100)));
    }
}

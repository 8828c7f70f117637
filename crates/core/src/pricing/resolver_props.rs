//! Property-based tests for TemporalResolver.
//!
//! Feature: temporal-resolution
//! - Property 1: At most one record in effect, and it contains the instant
//! - Property 2: Pending is open-ended and starts after the instant
//! - Property 3: Contiguous chains satisfy every record-set invariant
//! - Property 4: Batch resolution matches single resolution
//! - Property 5: Fallback amounts only apply without history

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use pricebook_shared::types::{Currency, PriceRecordId, ProductId};
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::resolver::{InvariantViolation, ResolveRequest, TemporalResolver};
use super::types::{PriceAmounts, PriceRecord, PriceSource, PriceTier, SubjectKey};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Strategy to generate positive IDR amounts (1 to 10,000,000).
fn idr_amount() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(Decimal::from)
}

/// Strategy to generate gaps between consecutive starts, in hours (1h to 90 days).
fn gaps() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(1i64..2_160i64, 1..6)
}

/// Strategy to generate tiers.
fn tier_strategy() -> impl Strategy<Value = PriceTier> {
    prop_oneof![
        Just(PriceTier::Cost),
        Just(PriceTier::Channel),
        Just(PriceTier::Direct),
        Just(PriceTier::List),
    ]
}

/// Strategy to generate an instant offset from 2024-01-01, in hours.
fn as_of_offset() -> impl Strategy<Value = i64> {
    -720i64..12_000i64
}

fn record(
    subject: SubjectKey,
    tier: PriceTier,
    from: DateTime<Utc>,
    to: Option<DateTime<Utc>>,
    idr: Decimal,
) -> PriceRecord {
    PriceRecord {
        id: PriceRecordId::new(),
        subject,
        tier,
        amounts: PriceAmounts::new().with(Currency::Idr, idr),
        exchange_rate: None,
        effective_from: from,
        effective_to: to,
        source: PriceSource::Import,
        change_reason: None,
        changed_by: None,
        created_at: base(),
    }
}

/// Helper to build a contiguous chain: each record ends where the next starts.
/// The last record is open-ended unless `closed_after` is given.
fn chain(
    subject: SubjectKey,
    tier: PriceTier,
    gaps: &[i64],
    idr: Decimal,
    closed_after: Option<i64>,
) -> Vec<PriceRecord> {
    let mut starts = vec![base()];
    for gap in gaps {
        let last = *starts.last().unwrap();
        starts.push(last + TimeDelta::hours(*gap));
    }

    let mut records: Vec<PriceRecord> = starts
        .windows(2)
        .map(|w| record(subject, tier, w[0], Some(w[1]), idr))
        .collect();
    let last_from = *starts.last().unwrap();
    records.push(record(
        subject,
        tier,
        last_from,
        closed_after.map(|h| last_from + TimeDelta::hours(h)),
        idr,
    ));
    records
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // =========================================================================
    // Property 1: At most one record in effect
    // =========================================================================

    /// Property 1.1: The current record contains the instant.
    ///
    /// *For any* contiguous chain and instant, the resolved current record
    /// SHALL be active at that instant, and SHALL be absent exactly when no
    /// record in the chain is active.
    #[test]
    fn prop_current_contains_instant(
        gaps in gaps(),
        tier in tier_strategy(),
        idr in idr_amount(),
        closed_after in prop::option::of(1i64..2_000i64),
        offset in as_of_offset(),
    ) {
        let subject = SubjectKey::product(ProductId::new());
        let records = chain(subject, tier, &gaps, idr, closed_after);
        let as_of = base() + TimeDelta::hours(offset);

        let resolved = TemporalResolver::resolve_at(&records, &subject, tier, as_of, None);
        let active: Vec<&PriceRecord> = records.iter().filter(|r| r.is_active_at(as_of)).collect();

        prop_assert!(active.len() <= 1, "Chain records must not overlap");
        match resolved.current {
            Some(current) => {
                prop_assert!(current.is_active_at(as_of));
                prop_assert_eq!(Some(current.id), active.first().map(|r| r.id));
            }
            None => prop_assert!(active.is_empty()),
        }
    }

    /// Property 1.2: Other subjects and tiers never leak into a resolution.
    ///
    /// *For any* chain, resolving a different subject SHALL return nothing.
    #[test]
    fn prop_resolution_scoped_to_subject(
        gaps in gaps(),
        tier in tier_strategy(),
        idr in idr_amount(),
        offset in as_of_offset(),
    ) {
        let subject = SubjectKey::product(ProductId::new());
        let other = SubjectKey::product(ProductId::new());
        let records = chain(subject, tier, &gaps, idr, None);
        let as_of = base() + TimeDelta::hours(offset);

        let resolved = TemporalResolver::resolve_at(&records, &other, tier, as_of, None);
        prop_assert!(resolved.is_empty());
    }

    // =========================================================================
    // Property 2: Pending record shape
    // =========================================================================

    /// Property 2.1: Pending is open-ended and strictly in the future.
    ///
    /// *For any* chain and instant, a resolved pending record SHALL have no
    /// end and SHALL start after the instant.
    #[test]
    fn prop_pending_is_open_and_future(
        gaps in gaps(),
        tier in tier_strategy(),
        idr in idr_amount(),
        closed_after in prop::option::of(1i64..2_000i64),
        offset in as_of_offset(),
    ) {
        let subject = SubjectKey::product(ProductId::new());
        let records = chain(subject, tier, &gaps, idr, closed_after);
        let as_of = base() + TimeDelta::hours(offset);

        let resolved = TemporalResolver::resolve_at(&records, &subject, tier, as_of, None);
        if let Some(pending) = resolved.pending {
            prop_assert!(pending.effective_to.is_none());
            prop_assert!(pending.effective_from > as_of);
            prop_assert!(pending.is_pending(as_of));
        }
        if closed_after.is_some() {
            let pending = TemporalResolver::pending_of(&records, &subject, tier, as_of);
            prop_assert!(pending.is_none(), "A closed chain has no pending record");
        }
    }

    // =========================================================================
    // Property 3: Invariants of contiguous chains
    // =========================================================================

    /// Property 3.1: A contiguous chain is sound at every instant.
    #[test]
    fn prop_chain_has_no_violations(
        gaps in gaps(),
        tier in tier_strategy(),
        idr in idr_amount(),
        closed_after in prop::option::of(1i64..2_000i64),
        offset in as_of_offset(),
    ) {
        let subject = SubjectKey::product(ProductId::new());
        let records = chain(subject, tier, &gaps, idr, closed_after);
        let now = base() + TimeDelta::hours(offset);

        let violations = TemporalResolver::check_invariants(&records, now);
        prop_assert!(violations.is_empty(), "Unexpected violations: {:?}", violations);
    }

    /// Property 3.2: A second open-ended future record is reported.
    ///
    /// *For any* chain, adding another open record that starts after the
    /// chain's open tail SHALL produce a MultiplePending violation while
    /// both are still in the future.
    #[test]
    fn prop_second_pending_detected(
        gaps in gaps(),
        idr in idr_amount(),
        extra in 1i64..1_000i64,
    ) {
        let subject = SubjectKey::product(ProductId::new());
        let tier = PriceTier::List;
        let mut records = chain(subject, tier, &gaps, idr, None);
        let tail_from = records.last().unwrap().effective_from;
        records.push(record(subject, tier, tail_from + TimeDelta::hours(extra), None, idr));

        let violations = TemporalResolver::check_invariants(&records, base() - TimeDelta::hours(1));
        let multiple_pending = violations.iter().any(|v| {
            matches!(v, InvariantViolation::MultiplePending { ids, .. } if ids.len() >= 2)
        });
        prop_assert!(multiple_pending);
    }

    /// Property 3.3: An open tail overlapping a later started record is reported.
    #[test]
    fn prop_overlap_detected(
        gaps in gaps(),
        idr in idr_amount(),
        extra in 1i64..1_000i64,
    ) {
        let subject = SubjectKey::product(ProductId::new());
        let tier = PriceTier::Cost;
        let mut records = chain(subject, tier, &gaps, idr, None);
        let tail_from = records.last().unwrap().effective_from;
        let late_from = tail_from + TimeDelta::hours(extra);
        records.push(record(subject, tier, late_from, None, idr));

        let violations = TemporalResolver::check_invariants(&records, late_from);
        let overlap = violations
            .iter()
            .any(|v| matches!(v, InvariantViolation::Overlap { .. }));
        prop_assert!(overlap);
    }

    // =========================================================================
    // Property 4: Batch resolution
    // =========================================================================

    /// Property 4.1: Batch results equal one-by-one results, in request order.
    #[test]
    fn prop_batch_matches_single(
        gap_sets in prop::collection::vec(gaps(), 1..5),
        idr in idr_amount(),
        offset in as_of_offset(),
    ) {
        let as_of = base() + TimeDelta::hours(offset);
        let mut records = Vec::new();
        let mut requests = Vec::new();
        for gaps in &gap_sets {
            let subject = SubjectKey::product(ProductId::new());
            records.extend(chain(subject, PriceTier::Channel, gaps, idr, None));
            requests.push(ResolveRequest {
                subject,
                tier: PriceTier::Channel,
                fallback: None,
            });
        }

        let batch = TemporalResolver::resolve_batch(&records, &requests, as_of);
        prop_assert_eq!(batch.len(), requests.len());
        for (req, resolved) in requests.iter().zip(&batch) {
            let single =
                TemporalResolver::resolve_at(&records, &req.subject, req.tier, as_of, None);
            prop_assert_eq!(resolved, &single);
        }
    }

    // =========================================================================
    // Property 5: Fallback amounts
    // =========================================================================

    /// Property 5.1: Fallback resolves as current only without history.
    ///
    /// *For any* fallback amount, a subject with no records SHALL resolve to
    /// the fallback, and a subject with history SHALL ignore it.
    #[test]
    fn prop_fallback_only_without_history(
        gaps in gaps(),
        idr in idr_amount(),
        fallback_idr in idr_amount(),
        offset in as_of_offset(),
    ) {
        let subject = SubjectKey::product(ProductId::new());
        let tier = PriceTier::Direct;
        let fallback = PriceAmounts::new().with(Currency::Idr, fallback_idr);
        let as_of = base() + TimeDelta::hours(offset);

        let bare = TemporalResolver::resolve_at(&[], &subject, tier, as_of, Some(&fallback));
        prop_assert_eq!(bare.current.map(|r| r.amounts), Some(fallback.clone()));
        prop_assert!(bare.pending.is_none());

        let records = chain(subject, tier, &gaps, idr, None);
        let with_history =
            TemporalResolver::resolve_at(&records, &subject, tier, as_of, Some(&fallback));
        let without = TemporalResolver::resolve_at(&records, &subject, tier, as_of, None);
        prop_assert_eq!(with_history, without);
    }
}

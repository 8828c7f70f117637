//! Property-based tests for PriceMutationService.
//!
//! Feature: price-versioning
//! - Property 1: Any operation sequence keeps at most one pending record
//! - Property 2: Any operation sequence keeps started records disjoint
//! - Property 3: Rejections never leave partial writes behind
//! - Property 4: Stored amounts equal the rounded input

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use pricebook_shared::types::{Currency, ProductId};
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::clock::{Clock, FixedClock};
use super::error::{ErrorKind, PricingError};
use super::resolver::TemporalResolver;
use super::service::{MutationMeta, PendingPriceInput, PriceMutationService};
use super::store::InMemoryPriceStore;
use super::types::{PriceAmounts, PriceTier, SubjectKey};
use crate::currency::{InMemoryRateProvider, LinkageMode};

type Service = PriceMutationService<InMemoryPriceStore, InMemoryRateProvider, FixedClock>;

const TIER: PriceTier = PriceTier::List;

/// One step of a random editing session.
#[derive(Debug, Clone)]
enum Op {
    /// Schedule or edit the pending price, `days` after the next business day.
    Upsert { days: i64, cents: i64 },
    /// Delete whatever is pending.
    DeletePending,
    /// Schedule deactivation `days` after the next business day.
    Deactivate { days: i64 },
    /// Cancel a scheduled deactivation.
    CancelDeactivation,
    /// Let time pass.
    Advance { hours: i64 },
}

/// Strategy to generate positive amounts in cents (0.01 to 10,000.00).
fn cents() -> impl Strategy<Value = i64> {
    1i64..1_000_000i64
}

/// Strategy to generate one operation, weighted towards upserts.
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0i64..60, cents()).prop_map(|(days, cents)| Op::Upsert { days, cents }),
        1 => Just(Op::DeletePending),
        1 => (0i64..60).prop_map(|days| Op::Deactivate { days }),
        1 => Just(Op::CancelDeactivation),
        2 => (0i64..1_500).prop_map(|hours| Op::Advance { hours }),
    ]
}

/// Strategy to generate operation sequences.
fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 1..25)
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap()
}

fn service(clock: &FixedClock) -> (Service, InMemoryPriceStore) {
    let store = InMemoryPriceStore::new();
    let service =
        PriceMutationService::new(store.clone(), InMemoryRateProvider::new(), clock.clone());
    (service, store)
}

/// Helper to format a business-local boundary `days` after the next business day.
fn local_after(service: &Service, now: DateTime<Utc>, days: i64) -> String {
    let tz = service.timezone();
    let earliest = tz.start_of_next_day(now).unwrap();
    tz.format_local(earliest + TimeDelta::days(days))
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

/// Runs `op`, returning the service error if it was rejected.
async fn run(
    service: &Service,
    store: &InMemoryPriceStore,
    clock: &FixedClock,
    subject: &SubjectKey,
    op: &Op,
) -> Option<PricingError> {
    let now = clock.now();
    let result = match op {
        Op::Upsert { days, cents } => {
            let amounts = PriceAmounts::new().with(Currency::Cny, Decimal::new(*cents, 2));
            let input = PendingPriceInput::new(amounts, local_after(service, now, *days))
                .with_rate(Decimal::new(15_400, 0))
                .with_linkage(LinkageMode::PrimaryIsCny);
            service
                .create_or_update_pending(subject, TIER, input)
                .await
                .map(|_| ())
        }
        Op::DeletePending => {
            let records = store.records();
            match TemporalResolver::pending_of(&records, subject, TIER, now) {
                Some(pending) => {
                    service
                        .delete_pending(subject, TIER, pending.id, MutationMeta::default())
                        .await
                }
                None => Ok(()),
            }
        }
        Op::Deactivate { days } => {
            let effective_to = local_after(service, now, *days);
            service
                .schedule_deactivation(subject, TIER, &effective_to, MutationMeta::default())
                .await
                .map(|_| ())
        }
        Op::CancelDeactivation => service
            .cancel_deactivation(subject, TIER, MutationMeta::default())
            .await
            .map(|_| ()),
        Op::Advance { hours } => {
            clock.advance(TimeDelta::hours(*hours));
            Ok(())
        }
    };
    result.err()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // =========================================================================
    // Property 1 and 2: Record-set invariants under arbitrary sessions
    // =========================================================================

    /// Property 1.1: Invariants hold after every step.
    ///
    /// *For any* sequence of upserts, deletions, deactivations and clock
    /// advances, the record set SHALL have at most one pending record and
    /// no overlapping started records after each step.
    #[test]
    fn prop_invariants_hold_after_every_step(ops in ops()) {
        let clock = FixedClock::new(start());
        let (service, store) = service(&clock);
        let subject = SubjectKey::product(ProductId::new());

        let outcome: Result<(), TestCaseError> = block_on(async {
            for op in &ops {
                let error = run(&service, &store, &clock, &subject, op).await;
                if let Some(err) = error {
                    prop_assert!(
                        matches!(err.kind(), ErrorKind::Conflict | ErrorKind::NotFound),
                        "Unexpected rejection of {:?}: {}", op, err
                    );
                    prop_assert!(
                        !matches!(err, PricingError::ConcurrentModification(_)),
                        "Store rejected a plan the service built: {}", err
                    );
                }

                let now = clock.now();
                let records = store.records();
                let violations = TemporalResolver::check_invariants(&records, now);
                prop_assert!(violations.is_empty(), "After {:?}: {:?}", op, violations);
                let pending = records.iter().filter(|r| r.is_pending(now)).count();
                prop_assert!(pending <= 1);
            }
            Ok(())
        });
        outcome?;
    }

    // =========================================================================
    // Property 3: Rejections are atomic
    // =========================================================================

    /// Property 3.1: A rejected operation leaves records and log untouched.
    #[test]
    fn prop_rejection_leaves_no_trace(ops in ops()) {
        let clock = FixedClock::new(start());
        let (service, store) = service(&clock);
        let subject = SubjectKey::product(ProductId::new());

        let outcome: Result<(), TestCaseError> = block_on(async {
            for op in &ops {
                let records_before = store.records();
                let log_before = store.change_log().len();
                if run(&service, &store, &clock, &subject, op).await.is_some() {
                    prop_assert_eq!(store.records(), records_before);
                    prop_assert_eq!(store.change_log().len(), log_before);
                }
            }
            Ok(())
        });
        outcome?;
    }

    // =========================================================================
    // Property 4: Stored amounts
    // =========================================================================

    /// Property 4.1: A freshly scheduled price resolves as pending with the
    /// rounded input amounts and the linked IDR amount.
    #[test]
    fn prop_scheduled_amounts_round_trip(
        cents in cents(),
        days in 0i64..60,
    ) {
        let clock = FixedClock::new(start());
        let (service, _store) = service(&clock);
        let subject = SubjectKey::product(ProductId::new());
        let cny = Decimal::new(cents, 2);

        let resolved = block_on(async {
            let input = PendingPriceInput::new(
                PriceAmounts::new().with(Currency::Cny, cny),
                local_after(&service, clock.now(), days),
            )
            .with_rate(Decimal::new(15_400, 0))
            .with_linkage(LinkageMode::PrimaryIsCny);
            service.create_or_update_pending(&subject, TIER, input).await.unwrap();
            service.resolve_at(&subject, TIER, clock.now(), None).await.unwrap()
        });

        prop_assert!(resolved.current.is_none());
        let pending = resolved.pending.unwrap();
        prop_assert_eq!(pending.amounts.get(Currency::Cny), Some(cny));
        prop_assert_eq!(
            pending.amounts.get(Currency::Idr),
            Some(Currency::Idr.round(cny * Decimal::new(15_400, 0)))
        );
    }
}

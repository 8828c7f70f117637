//! Price mutation service: the only writer of versioned price records.
//!
//! Every mutation follows the same shape: validate the input, take the
//! per-subject writer lock, load the live records, build a [`MutationPlan`]
//! with its change log entries, and hand the plan to the store in one call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pricebook_shared::config::PricingConfig;
use pricebook_shared::types::{Currency, PageRequest, PageResponse, PriceRecordId, UserId};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use super::cache::ResolutionCache;
use super::changelog::{
    ChangeContext, ChangeLogEntry, ChangeLogFilter, ChangeLogRecorder, ChangeType,
};
use super::clock::Clock;
use super::error::PricingError;
use super::resolver::TemporalResolver;
use super::store::{BoundaryStamp, MutationPlan, PendingPatch, PriceStore};
use super::timezone::BusinessTimezone;
use super::types::{PriceAmounts, PriceRecord, PriceSource, PriceTier, ResolvedPrice, SubjectKey};
use crate::currency::{CurrencyLinkageCalculator, ExchangeRateProvider, LinkageMode};

/// Scheduling rules applied to every requested boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    /// Boundaries may not fall before the next business-local midnight.
    pub require_next_business_day: bool,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            require_next_business_day: true,
        }
    }
}

/// Request to schedule or edit the pending price of a subject and tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPriceInput {
    /// Entered amounts.
    pub amounts: PriceAmounts,
    /// IDR per 1 CNY. Looked up at the new start when a linkage mode is
    /// active and no rate is given.
    pub exchange_rate: Option<Decimal>,
    /// Business-local start, `YYYY-MM-DDTHH:mm`.
    pub effective_from_local: String,
    /// Which currency drives derivation.
    pub linkage: LinkageMode,
    /// Why the price is changing.
    pub reason: Option<String>,
    /// Provenance.
    pub source: PriceSource,
    /// Editor.
    pub changed_by: Option<UserId>,
}

impl PendingPriceInput {
    /// Manual entry of `amounts` starting at `effective_from_local`.
    #[must_use]
    pub fn new(amounts: PriceAmounts, effective_from_local: impl Into<String>) -> Self {
        Self {
            amounts,
            exchange_rate: None,
            effective_from_local: effective_from_local.into(),
            linkage: LinkageMode::None,
            reason: None,
            source: PriceSource::Manual,
            changed_by: None,
        }
    }

    /// Sets the exchange rate.
    #[must_use]
    pub fn with_rate(mut self, rate: Decimal) -> Self {
        self.exchange_rate = Some(rate);
        self
    }

    /// Sets the linkage mode.
    #[must_use]
    pub fn with_linkage(mut self, linkage: LinkageMode) -> Self {
        self.linkage = linkage;
        self
    }

    /// Sets the reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the provenance.
    #[must_use]
    pub fn with_source(mut self, source: PriceSource) -> Self {
        self.source = source;
        self
    }

    /// Sets the editor.
    #[must_use]
    pub fn by(mut self, user: UserId) -> Self {
        self.changed_by = Some(user);
        self
    }
}

/// Who is changing a price and why.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationMeta {
    /// Why.
    pub reason: Option<String>,
    /// Who.
    pub changed_by: Option<UserId>,
}

type WriterLocks = DashMap<(SubjectKey, PriceTier), Arc<Mutex<()>>>;

/// Holds the writer lock for one `(subject, tier)`. Dropping it releases the
/// lock and removes the map entry when no other writer is queued on it.
struct WriterGuard {
    locks: Arc<WriterLocks>,
    key: (SubjectKey, PriceTier),
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Enforces the price versioning invariants on every write and exposes the
/// read paths.
pub struct PriceMutationService<S, R, C> {
    store: S,
    rates: R,
    clock: C,
    timezone: BusinessTimezone,
    policy: PricingPolicy,
    cache: Option<ResolutionCache>,
    locks: Arc<WriterLocks>,
}

impl<S, R, C> PriceMutationService<S, R, C>
where
    S: PriceStore,
    R: ExchangeRateProvider,
    C: Clock,
{
    /// Creates a service with the default timezone and policy and no cache.
    pub fn new(store: S, rates: R, clock: C) -> Self {
        Self {
            store,
            rates,
            clock,
            timezone: BusinessTimezone::default(),
            policy: PricingPolicy::default(),
            cache: None,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Creates a service configured from `config`.
    ///
    /// A zero cache capacity disables resolution caching.
    pub fn from_config(
        store: S,
        rates: R,
        clock: C,
        config: &PricingConfig,
    ) -> Result<Self, PricingError> {
        let timezone = BusinessTimezone::from_offset_hours(config.business_utc_offset_hours)?;
        let cache = (config.resolution_cache_capacity > 0).then(|| {
            ResolutionCache::with_config(
                config.resolution_cache_capacity,
                config.resolution_cache_ttl_secs,
            )
        });
        Ok(Self {
            timezone,
            policy: PricingPolicy {
                require_next_business_day: config.require_next_business_day,
            },
            cache,
            ..Self::new(store, rates, clock)
        })
    }

    /// Replaces the business timezone.
    #[must_use]
    pub fn with_timezone(mut self, timezone: BusinessTimezone) -> Self {
        self.timezone = timezone;
        self
    }

    /// Replaces the scheduling policy.
    #[must_use]
    pub fn with_policy(mut self, policy: PricingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enables resolution caching.
    #[must_use]
    pub fn with_cache(mut self, cache: ResolutionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The business timezone.
    pub fn timezone(&self) -> BusinessTimezone {
        self.timezone
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Schedules a pending price, or edits the existing one in place.
    ///
    /// Never creates a second pending record. When no pending record exists
    /// the active record's end is stamped to the new start.
    pub async fn create_or_update_pending(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
        input: PendingPriceInput,
    ) -> Result<PriceRecord, PricingError> {
        let result = self.upsert_pending(subject, tier, input).await;
        Self::log_rejection("create_or_update_pending", subject, tier, &result);
        result
    }

    /// Removes a pending record and re-opens the record it had superseded.
    pub async fn delete_pending(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
        id: PriceRecordId,
        meta: MutationMeta,
    ) -> Result<(), PricingError> {
        let result = self.remove_pending(subject, tier, id, meta).await;
        Self::log_rejection("delete_pending", subject, tier, &result);
        result
    }

    /// Schedules the active record to end at `effective_to_local` with
    /// nothing after it.
    pub async fn schedule_deactivation(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
        effective_to_local: &str,
        meta: MutationMeta,
    ) -> Result<PriceRecord, PricingError> {
        let result = self.close_active(subject, tier, effective_to_local, meta).await;
        Self::log_rejection("schedule_deactivation", subject, tier, &result);
        result
    }

    /// Re-opens an active record whose scheduled end has not passed.
    pub async fn cancel_deactivation(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
        meta: MutationMeta,
    ) -> Result<PriceRecord, PricingError> {
        let result = self.reopen_active(subject, tier, meta).await;
        Self::log_rejection("cancel_deactivation", subject, tier, &result);
        result
    }

    /// Returns what is in effect at `as_of` and what is pending after it.
    pub async fn resolve_at(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
        as_of: DateTime<Utc>,
        fallback: Option<&PriceAmounts>,
    ) -> Result<ResolvedPrice, PricingError> {
        subject.validate()?;
        let history = self.store.list_history(subject, tier).await?;
        Ok(TemporalResolver::resolve_at(&history, subject, tier, as_of, fallback))
    }

    /// Resolves at the minute containing `as_of`, memoized when a cache is
    /// configured.
    pub async fn resolve_cached(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
        as_of: DateTime<Utc>,
        fallback: Option<&PriceAmounts>,
    ) -> Result<ResolvedPrice, PricingError> {
        let minute = ResolutionCache::truncate_to_minute(as_of);
        let Some(cache) = &self.cache else {
            return self.resolve_at(subject, tier, minute, fallback).await;
        };
        if let Some(hit) = cache.get(subject, tier, minute, fallback) {
            return Ok(hit);
        }
        let generation = cache.generation();
        let resolved = self.resolve_at(subject, tier, minute, fallback).await?;
        cache.insert_if_current(subject, tier, minute, fallback, generation, resolved.clone());
        Ok(resolved)
    }

    /// Derives a linked currency amount. See [`CurrencyLinkageCalculator`].
    pub fn compute_linked_amount(
        &self,
        primary_currency: Currency,
        primary_amount: Decimal,
        rate: Decimal,
        mode: LinkageMode,
    ) -> Option<Decimal> {
        CurrencyLinkageCalculator::derive_amount(primary_currency, primary_amount, rate, mode)
    }

    /// One page of a subject's change log, newest first.
    pub async fn list_change_log(
        &self,
        subject: &SubjectKey,
        filter: &ChangeLogFilter,
        page: &PageRequest,
    ) -> Result<PageResponse<ChangeLogEntry>, PricingError> {
        subject.validate()?;
        Ok(self.store.list_change_log(subject, filter, page).await?)
    }

    async fn upsert_pending(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
        input: PendingPriceInput,
    ) -> Result<PriceRecord, PricingError> {
        subject.validate()?;
        validate_amounts(&input.amounts)?;
        if let Some(rate) = input.exchange_rate.filter(|r| *r <= Decimal::ZERO) {
            return Err(PricingError::NonPositiveRate(rate));
        }

        let now = self.clock.now();
        let effective_from = self.timezone.parse_local(&input.effective_from_local)?;
        self.ensure_schedulable(effective_from, now)?;

        let rate = match (input.exchange_rate, input.linkage.is_active()) {
            (None, true) => Some(
                self.rates
                    .get_rate(Currency::Cny, Currency::Idr, effective_from)
                    .await?,
            ),
            (rate, _) => rate,
        };
        let amounts =
            CurrencyLinkageCalculator::apply(&input.amounts, rate, input.linkage)?.rounded();

        let _guard = self.lock(subject, tier).await;
        let records = self.store.list_current_and_pending(subject, tier, now).await?;
        let ctx = ChangeContext {
            reason: input.reason.clone(),
            changed_by: input.changed_by,
            changed_at: now,
        };

        let mut plan = MutationPlan::default();
        let pending = TemporalResolver::pending_of(&records, subject, tier, now);
        let (record, change_type) = match pending {
            Some(pending) => {
                let patch = PendingPatch {
                    amounts,
                    exchange_rate: rate,
                    effective_from,
                    source: input.source,
                    change_reason: input.reason,
                    changed_by: input.changed_by,
                };
                let mut updated = pending.clone();
                patch.apply_to(&mut updated);

                if let Some(prev) = TemporalResolver::predecessor_of(
                    &records,
                    subject,
                    tier,
                    pending.effective_from,
                    Some(pending.id),
                ) {
                    let stamped_to_pending = prev.effective_to == Some(pending.effective_from);
                    let overlaps_new_start = prev.effective_to.is_none_or(|to| to > effective_from);
                    if (stamped_to_pending || overlaps_new_start)
                        && prev.effective_to != Some(effective_from)
                    {
                        plan.stamps.push(BoundaryStamp {
                            id: prev.id,
                            effective_to: Some(effective_from),
                        });
                    }
                }

                plan.change_log = ChangeLogRecorder::diff(
                    Some(pending),
                    Some(&updated),
                    ChangeType::Update,
                    &ctx,
                );
                plan.patches.push((pending.id, patch));
                (updated, ChangeType::Update)
            }
            None => {
                let record = PriceRecord {
                    id: PriceRecordId::new(),
                    subject: *subject,
                    tier,
                    amounts,
                    exchange_rate: rate,
                    effective_from,
                    effective_to: None,
                    source: input.source,
                    change_reason: input.reason,
                    changed_by: input.changed_by,
                    created_at: now,
                };

                let current =
                    TemporalResolver::resolve_at(&records, subject, tier, now, None).current;
                if let Some(active) = &current
                    && active.effective_to.is_none_or(|to| to > effective_from)
                {
                    plan.stamps.push(BoundaryStamp {
                        id: active.id,
                        effective_to: Some(effective_from),
                    });
                }

                plan.change_log = ChangeLogRecorder::diff(
                    current.as_ref(),
                    Some(&record),
                    ChangeType::Create,
                    &ctx,
                );
                plan.inserts.push(record.clone());
                (record, ChangeType::Create)
            }
        };

        let entries = plan.change_log.len();
        self.store.apply(plan).await?;
        self.invalidate(subject);

        info!(
            product_id = %subject.product_id,
            organization_id = ?subject.organization_id,
            tier = %tier,
            record_id = %record.id,
            effective_from = %record.effective_from,
            change_type = change_type.as_str(),
            entries,
            "Pending price saved"
        );
        Ok(record)
    }

    async fn remove_pending(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
        id: PriceRecordId,
        meta: MutationMeta,
    ) -> Result<(), PricingError> {
        subject.validate()?;
        let now = self.clock.now();

        let _guard = self.lock(subject, tier).await;
        let history = self.store.list_history(subject, tier).await?;
        let target = history
            .iter()
            .find(|r| r.id == id)
            .ok_or(PricingError::RecordNotFound(id))?;
        if !TemporalResolver::state_of(target, &history, now).is_editable() {
            return Err(PricingError::AlreadyActive {
                id,
                effective_from: target.effective_from,
            });
        }
        if !target.is_pending(now) {
            return Err(PricingError::RecordNotFound(id));
        }

        let ctx = ChangeContext {
            reason: meta.reason,
            changed_by: meta.changed_by,
            changed_at: now,
        };
        let mut plan = MutationPlan {
            deletes: vec![id],
            change_log: ChangeLogRecorder::diff(Some(target), None, ChangeType::Delete, &ctx),
            ..MutationPlan::default()
        };
        if let Some(prev) = history
            .iter()
            .find(|r| r.id != id && r.effective_to == Some(target.effective_from))
        {
            plan.stamps.push(BoundaryStamp {
                id: prev.id,
                effective_to: None,
            });
        }

        self.store.apply(plan).await?;
        self.invalidate(subject);

        info!(
            product_id = %subject.product_id,
            organization_id = ?subject.organization_id,
            tier = %tier,
            record_id = %id,
            "Pending price deleted"
        );
        Ok(())
    }

    async fn close_active(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
        effective_to_local: &str,
        meta: MutationMeta,
    ) -> Result<PriceRecord, PricingError> {
        subject.validate()?;
        let now = self.clock.now();
        let effective_to = self.timezone.parse_local(effective_to_local)?;
        self.ensure_schedulable(effective_to, now)?;

        let _guard = self.lock(subject, tier).await;
        let records = self.store.list_current_and_pending(subject, tier, now).await?;
        if let Some(pending) = TemporalResolver::pending_of(&records, subject, tier, now) {
            return Err(PricingError::PendingExists { id: pending.id });
        }
        let active = TemporalResolver::resolve_at(&records, subject, tier, now, None)
            .current
            .ok_or(PricingError::NoActiveRecord { tier })?;
        if let Some(to) = active.effective_to {
            return Err(PricingError::AlreadyClosed {
                id: active.id,
                effective_to: to,
            });
        }

        let mut closed = active.clone();
        closed.effective_to = Some(effective_to);
        self.apply_boundary_change(&active, &closed, ChangeType::Deactivate, meta, now)
            .await?;

        info!(
            product_id = %subject.product_id,
            organization_id = ?subject.organization_id,
            tier = %tier,
            record_id = %closed.id,
            effective_to = %effective_to,
            "Price deactivation scheduled"
        );
        Ok(closed)
    }

    async fn reopen_active(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
        meta: MutationMeta,
    ) -> Result<PriceRecord, PricingError> {
        subject.validate()?;
        let now = self.clock.now();

        let _guard = self.lock(subject, tier).await;
        let records = self.store.list_current_and_pending(subject, tier, now).await?;
        if let Some(pending) = TemporalResolver::pending_of(&records, subject, tier, now) {
            return Err(PricingError::PendingExists { id: pending.id });
        }
        let active = TemporalResolver::resolve_at(&records, subject, tier, now, None)
            .current
            .ok_or(PricingError::NoActiveRecord { tier })?;
        if active.effective_to.is_none() {
            return Err(PricingError::NotClosed { id: active.id });
        }

        let mut reopened = active.clone();
        reopened.effective_to = None;
        self.apply_boundary_change(&active, &reopened, ChangeType::Activate, meta, now)
            .await?;

        info!(
            product_id = %subject.product_id,
            organization_id = ?subject.organization_id,
            tier = %tier,
            record_id = %reopened.id,
            "Price deactivation cancelled"
        );
        Ok(reopened)
    }

    async fn apply_boundary_change(
        &self,
        before: &PriceRecord,
        after: &PriceRecord,
        change_type: ChangeType,
        meta: MutationMeta,
        now: DateTime<Utc>,
    ) -> Result<(), PricingError> {
        let ctx = ChangeContext {
            reason: meta.reason,
            changed_by: meta.changed_by,
            changed_at: now,
        };
        let plan = MutationPlan {
            stamps: vec![BoundaryStamp {
                id: after.id,
                effective_to: after.effective_to,
            }],
            change_log: ChangeLogRecorder::diff(Some(before), Some(after), change_type, &ctx),
            ..MutationPlan::default()
        };
        self.store.apply(plan).await?;
        self.invalidate(&after.subject);
        Ok(())
    }

    fn ensure_schedulable(
        &self,
        requested: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), PricingError> {
        if requested <= now {
            return Err(PricingError::NotInFuture { requested, now });
        }
        if self.policy.require_next_business_day {
            let earliest = self.timezone.start_of_next_day(now)?;
            if requested < earliest {
                return Err(PricingError::BeforeNextBusinessDay {
                    requested,
                    earliest,
                });
            }
        }
        Ok(())
    }

    async fn lock(&self, subject: &SubjectKey, tier: PriceTier) -> WriterGuard {
        let key = (*subject, tier);
        let mutex = self.locks.entry(key).or_default().clone();
        WriterGuard {
            locks: Arc::clone(&self.locks),
            key,
            guard: Some(mutex.lock_owned().await),
        }
    }

    fn invalidate(&self, subject: &SubjectKey) {
        if let Some(cache) = &self.cache {
            cache.invalidate_subject(subject);
        }
    }

    fn log_rejection<T>(
        operation: &'static str,
        subject: &SubjectKey,
        tier: PriceTier,
        result: &Result<T, PricingError>,
    ) {
        if let Err(err) = result
            && err.is_conflict()
        {
            warn!(
                operation,
                product_id = %subject.product_id,
                organization_id = ?subject.organization_id,
                tier = %tier,
                error_code = err.error_code(),
                error = %err,
                "Price mutation rejected"
            );
        }
    }
}

fn validate_amounts(amounts: &PriceAmounts) -> Result<(), PricingError> {
    if !amounts.has_any_value() {
        return Err(PricingError::NoAmounts);
    }
    if let Some((currency, amount)) = amounts.first_negative() {
        return Err(PricingError::NegativeAmount { currency, amount });
    }
    Ok(())
}

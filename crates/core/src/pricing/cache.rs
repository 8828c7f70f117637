//! Resolution result caching using Moka.
//!
//! List-heavy views resolve the same subjects over and over within a
//! minute. Entries are keyed by the instant truncated to the minute and are
//! dropped for a subject whenever one of its records changes.
//!
//! A resolution read from the store can finish after a write invalidated the
//! subject. Callers take a [`ResolutionCache::generation`] before reading and
//! insert with [`ResolutionCache::insert_if_current`], which refuses the
//! insert once any invalidation has happened in between.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use moka::sync::Cache;
use tracing::debug;

use super::types::{PriceAmounts, PriceTier, ResolvedPrice, SubjectKey};

/// Default cache capacity (number of entries).
const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Default time-to-live for cache entries (1 minute).
const DEFAULT_TTL_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    subject: SubjectKey,
    tier: PriceTier,
    minute: DateTime<Utc>,
    fallback: Option<PriceAmounts>,
}

/// Cache for resolution results.
#[derive(Clone)]
pub struct ResolutionCache {
    cache: Cache<CacheKey, Arc<ResolvedPrice>>,
    // Bumped before every invalidation. Inserts hold the read side.
    generation: Arc<RwLock<u64>>,
}

impl ResolutionCache {
    /// Creates a cache with default settings: 10,000 entries, 1 minute TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_CACHE_CAPACITY, DEFAULT_TTL_SECS)
    }

    /// Creates a cache with custom capacity and TTL.
    #[must_use]
    pub fn with_config(max_capacity: u64, ttl_secs: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .support_invalidation_closures()
            .build();

        Self {
            cache,
            generation: Arc::new(RwLock::new(0)),
        }
    }

    /// Truncates `instant` to the start of its minute.
    #[must_use]
    pub fn truncate_to_minute(instant: DateTime<Utc>) -> DateTime<Utc> {
        instant
            .duration_trunc(TimeDelta::minutes(1))
            .unwrap_or(instant)
    }

    /// Returns the cached resolution for the minute containing `as_of`.
    #[must_use]
    pub fn get(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
        as_of: DateTime<Utc>,
        fallback: Option<&PriceAmounts>,
    ) -> Option<ResolvedPrice> {
        let key = Self::key(subject, tier, as_of, fallback);
        let hit = self.cache.get(&key).map(|cached| (*cached).clone());
        debug!(
            subject = %subject,
            tier = %tier,
            minute = %key.minute,
            hit = hit.is_some(),
            "resolution cache lookup"
        );
        hit
    }

    /// Caches `resolved` for the minute containing `as_of`.
    pub fn insert(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
        as_of: DateTime<Utc>,
        fallback: Option<&PriceAmounts>,
        resolved: ResolvedPrice,
    ) {
        let key = Self::key(subject, tier, as_of, fallback);
        self.cache.insert(key, Arc::new(resolved));
    }

    /// Current invalidation generation. Read it before resolving from the
    /// store and pass it to [`Self::insert_if_current`].
    #[must_use]
    pub fn generation(&self) -> u64 {
        *self.generation.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Caches `resolved` unless an invalidation happened after `generation`
    /// was read. Returns whether the entry was stored.
    pub fn insert_if_current(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
        as_of: DateTime<Utc>,
        fallback: Option<&PriceAmounts>,
        generation: u64,
        resolved: ResolvedPrice,
    ) -> bool {
        let current = self.generation.read().unwrap_or_else(PoisonError::into_inner);
        if *current != generation {
            debug!(
                subject = %subject,
                tier = %tier,
                "resolution cache insert skipped after invalidation"
            );
            return false;
        }
        self.insert(subject, tier, as_of, fallback, resolved);
        true
    }

    /// Returns the cached resolution for the minute containing `as_of`, or
    /// computes it with `resolve` at that minute and caches it.
    pub fn get_or_resolve<F>(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
        as_of: DateTime<Utc>,
        fallback: Option<&PriceAmounts>,
        resolve: F,
    ) -> ResolvedPrice
    where
        F: FnOnce(DateTime<Utc>) -> ResolvedPrice,
    {
        if let Some(cached) = self.get(subject, tier, as_of, fallback) {
            return cached;
        }
        let generation = self.generation();
        let resolved = resolve(Self::truncate_to_minute(as_of));
        self.insert_if_current(subject, tier, as_of, fallback, generation, resolved.clone());
        resolved
    }

    fn key(
        subject: &SubjectKey,
        tier: PriceTier,
        as_of: DateTime<Utc>,
        fallback: Option<&PriceAmounts>,
    ) -> CacheKey {
        CacheKey {
            subject: *subject,
            tier,
            minute: Self::truncate_to_minute(as_of),
            fallback: fallback.cloned(),
        }
    }

    /// Drops every entry for `subject`.
    pub fn invalidate_subject(&self, subject: &SubjectKey) {
        self.bump_generation();
        let subject = *subject;
        if self
            .cache
            .invalidate_entries_if(move |key, _| key.subject == subject)
            .is_err()
        {
            self.cache.invalidate_all();
        }
    }

    /// Drops every entry.
    pub fn invalidate_all(&self) {
        self.bump_generation();
        self.cache.invalidate_all();
    }

    fn bump_generation(&self) {
        let mut generation = self.generation.write().unwrap_or_else(PoisonError::into_inner);
        *generation = generation.wrapping_add(1);
    }

    /// Returns the number of entries currently in the cache.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs cache maintenance tasks.
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new()
    }
}

//! Persistence interface for versioned price records and the in-memory
//! adapter.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricebook_shared::types::{PageRequest, PageResponse, PriceRecordId, UserId};
use rust_decimal::Decimal;
use thiserror::Error;

use super::changelog::{ChangeLogEntry, ChangeLogFilter, ChangeLogRecorder};
use super::types::{PriceAmounts, PriceRecord, PriceSource, PriceTier, SubjectKey};

/// Errors raised by persistence adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A second open-ended record for the same subject and tier.
    #[error("An open-ended {tier} price already exists for subject {subject}")]
    DuplicateOpenRecord {
        /// Subject.
        subject: SubjectKey,
        /// Tier.
        tier: PriceTier,
    },

    /// No open record with this id.
    #[error("Price record {0} not found")]
    NotFound(PriceRecordId),

    /// The backend failed.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Editable fields of a pending record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPatch {
    /// New amounts.
    pub amounts: PriceAmounts,
    /// New entry-time exchange rate.
    pub exchange_rate: Option<Decimal>,
    /// New start instant.
    pub effective_from: DateTime<Utc>,
    /// New provenance.
    pub source: PriceSource,
    /// New reason.
    pub change_reason: Option<String>,
    /// Editor.
    pub changed_by: Option<UserId>,
}

impl PendingPatch {
    /// Writes the patch onto `record`.
    pub fn apply_to(&self, record: &mut PriceRecord) {
        record.amounts = self.amounts.clone();
        record.exchange_rate = self.exchange_rate;
        record.effective_from = self.effective_from;
        record.source = self.source;
        record.change_reason.clone_from(&self.change_reason);
        record.changed_by = self.changed_by;
    }
}

/// Sets or clears a record's exclusive end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryStamp {
    /// The record.
    pub id: PriceRecordId,
    /// New end, `None` re-opens the record.
    pub effective_to: Option<DateTime<Utc>>,
}

/// Every write of one accepted mutation.
///
/// Applied in order: deletes, boundary stamps, pending patches, inserts,
/// then change log appends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationPlan {
    /// Pending records to remove.
    pub deletes: Vec<PriceRecordId>,
    /// Boundary changes.
    pub stamps: Vec<BoundaryStamp>,
    /// Pending record edits.
    pub patches: Vec<(PriceRecordId, PendingPatch)>,
    /// New records.
    pub inserts: Vec<PriceRecord>,
    /// Audit entries.
    pub change_log: Vec<ChangeLogEntry>,
}

impl MutationPlan {
    /// Returns true if the plan writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty()
            && self.stamps.is_empty()
            && self.patches.is_empty()
            && self.inserts.is_empty()
            && self.change_log.is_empty()
    }
}

/// Storage for price records and their change log.
///
/// Adapters must reject a second record with `effective_to` unset for the
/// same subject and tier with [`StoreError::DuplicateOpenRecord`].
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Records for `(subject, tier)` that have not ended by `now`.
    async fn list_current_and_pending(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
        now: DateTime<Utc>,
    ) -> Result<Vec<PriceRecord>, StoreError>;

    /// Every record for `(subject, tier)`, oldest first.
    async fn list_history(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
    ) -> Result<Vec<PriceRecord>, StoreError>;

    /// Inserts a record.
    async fn insert(&self, record: PriceRecord) -> Result<(), StoreError>;

    /// Edits the open record `id`.
    async fn update_pending_by_id(
        &self,
        id: PriceRecordId,
        patch: PendingPatch,
    ) -> Result<PriceRecord, StoreError>;

    /// Removes the open record `id`.
    async fn delete_pending_by_id(&self, id: PriceRecordId) -> Result<(), StoreError>;

    /// Sets or clears a record's end.
    async fn set_effective_to(&self, stamp: BoundaryStamp) -> Result<(), StoreError>;

    /// Appends an audit entry.
    async fn append_change_log(&self, entry: ChangeLogEntry) -> Result<(), StoreError>;

    /// One page of a subject's change log, newest first.
    async fn list_change_log(
        &self,
        subject: &SubjectKey,
        filter: &ChangeLogFilter,
        page: &PageRequest,
    ) -> Result<PageResponse<ChangeLogEntry>, StoreError>;

    /// Applies every write of `plan`.
    ///
    /// The default runs the individual operations in plan order without
    /// atomicity; adapters with transactions override it.
    async fn apply(&self, plan: MutationPlan) -> Result<(), StoreError> {
        for id in plan.deletes {
            self.delete_pending_by_id(id).await?;
        }
        for stamp in plan.stamps {
            self.set_effective_to(stamp).await?;
        }
        for (id, patch) in plan.patches {
            self.update_pending_by_id(id, patch).await?;
        }
        for record in plan.inserts {
            self.insert(record).await?;
        }
        for entry in plan.change_log {
            self.append_change_log(entry).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    records: Vec<PriceRecord>,
    change_log: Vec<ChangeLogEntry>,
}

impl State {
    fn open_record_mut(&mut self, id: PriceRecordId) -> Result<&mut PriceRecord, StoreError> {
        self.records
            .iter_mut()
            .find(|r| r.id == id && r.effective_to.is_none())
            .ok_or(StoreError::NotFound(id))
    }

    fn ensure_single_open(&self, subject: &SubjectKey, tier: PriceTier) -> Result<(), StoreError> {
        let open = self
            .records
            .iter()
            .filter(|r| r.belongs_to(subject, tier) && r.effective_to.is_none())
            .count();
        if open > 1 {
            return Err(StoreError::DuplicateOpenRecord {
                subject: *subject,
                tier,
            });
        }
        Ok(())
    }

    fn insert(&mut self, record: PriceRecord) -> Result<(), StoreError> {
        let (subject, tier) = (record.subject, record.tier);
        self.records.push(record);
        self.ensure_single_open(&subject, tier)
    }

    fn update_pending(
        &mut self,
        id: PriceRecordId,
        patch: &PendingPatch,
    ) -> Result<PriceRecord, StoreError> {
        let record = self.open_record_mut(id)?;
        patch.apply_to(record);
        Ok(record.clone())
    }

    fn delete_pending(&mut self, id: PriceRecordId) -> Result<(), StoreError> {
        let index = self
            .records
            .iter()
            .position(|r| r.id == id && r.effective_to.is_none())
            .ok_or(StoreError::NotFound(id))?;
        self.records.remove(index);
        Ok(())
    }

    fn stamp(&mut self, stamp: BoundaryStamp) -> Result<(), StoreError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == stamp.id)
            .ok_or(StoreError::NotFound(stamp.id))?;
        record.effective_to = stamp.effective_to;
        let (subject, tier) = (record.subject, record.tier);
        self.ensure_single_open(&subject, tier)
    }

    fn apply(&mut self, plan: MutationPlan) -> Result<(), StoreError> {
        for id in plan.deletes {
            self.delete_pending(id)?;
        }
        for stamp in plan.stamps {
            self.stamp(stamp)?;
        }
        for (id, patch) in &plan.patches {
            self.update_pending(*id, patch)?;
        }
        for record in plan.inserts {
            self.insert(record)?;
        }
        self.change_log.extend(plan.change_log);
        Ok(())
    }
}

/// Price store backed by process memory.
///
/// `apply` stages the plan on a copy and swaps it in only when every step
/// succeeds.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPriceStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryPriceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded with `records`.
    #[must_use]
    pub fn from_records(records: Vec<PriceRecord>) -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                records,
                change_log: Vec::new(),
            })),
        }
    }

    /// Snapshot of every stored record.
    #[must_use]
    pub fn records(&self) -> Vec<PriceRecord> {
        self.read().records.clone()
    }

    /// Snapshot of every change log entry, in append order.
    #[must_use]
    pub fn change_log(&self) -> Vec<ChangeLogEntry> {
        self.read().change_log.clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn sorted(mut records: Vec<PriceRecord>) -> Vec<PriceRecord> {
        records.sort_by_key(|r| r.effective_from);
        records
    }
}

#[async_trait]
impl PriceStore for InMemoryPriceStore {
    async fn list_current_and_pending(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
        now: DateTime<Utc>,
    ) -> Result<Vec<PriceRecord>, StoreError> {
        let records = self
            .read()
            .records
            .iter()
            .filter(|r| r.belongs_to(subject, tier) && r.effective_to.is_none_or(|to| to > now))
            .cloned()
            .collect();
        Ok(Self::sorted(records))
    }

    async fn list_history(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
    ) -> Result<Vec<PriceRecord>, StoreError> {
        let records = self
            .read()
            .records
            .iter()
            .filter(|r| r.belongs_to(subject, tier))
            .cloned()
            .collect();
        Ok(Self::sorted(records))
    }

    async fn insert(&self, record: PriceRecord) -> Result<(), StoreError> {
        self.apply(MutationPlan {
            inserts: vec![record],
            ..MutationPlan::default()
        })
        .await
    }

    async fn update_pending_by_id(
        &self,
        id: PriceRecordId,
        patch: PendingPatch,
    ) -> Result<PriceRecord, StoreError> {
        self.write().update_pending(id, &patch)
    }

    async fn delete_pending_by_id(&self, id: PriceRecordId) -> Result<(), StoreError> {
        self.write().delete_pending(id)
    }

    async fn set_effective_to(&self, stamp: BoundaryStamp) -> Result<(), StoreError> {
        self.apply(MutationPlan {
            stamps: vec![stamp],
            ..MutationPlan::default()
        })
        .await
    }

    async fn append_change_log(&self, entry: ChangeLogEntry) -> Result<(), StoreError> {
        self.write().change_log.push(entry);
        Ok(())
    }

    async fn list_change_log(
        &self,
        subject: &SubjectKey,
        filter: &ChangeLogFilter,
        page: &PageRequest,
    ) -> Result<PageResponse<ChangeLogEntry>, StoreError> {
        let state = self.read();
        Ok(ChangeLogRecorder::query(&state.change_log, subject, filter, page))
    }

    async fn apply(&self, plan: MutationPlan) -> Result<(), StoreError> {
        let mut state = self.write();
        let mut staged = state.clone();
        staged.apply(plan)?;
        *state = staged;
        Ok(())
    }
}

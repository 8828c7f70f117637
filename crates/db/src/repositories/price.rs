//! PostgreSQL-backed price store.
//!
//! Every [`MutationPlan`] is applied inside one database transaction. The
//! partial unique index on open-ended records turns a racing second writer
//! into [`StoreError::DuplicateOpenRecord`], which the service reports as a
//! concurrent modification.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use pricebook_core::pricing::{
    BoundaryStamp, ChangeLogEntry, ChangeLogFilter, ChangeType, EffectiveWindow, MutationPlan,
    PendingPatch, PriceAmounts, PriceRecord, PriceSource, PriceStore, PriceTier, StoreError,
    SubjectKey,
};
use pricebook_shared::types::{
    ChangeLogId, Currency, OrganizationId, PageRequest, PageResponse, PriceRecordId, ProductId,
    UserId,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
    TransactionTrait,
};
use tracing::{debug, error};

use crate::entities::{price_change_logs, price_records};

/// Price store over the `price_records` and `price_change_logs` tables.
#[derive(Debug, Clone)]
pub struct PriceRepository {
    db: DatabaseConnection,
}

impl PriceRepository {
    /// Creates a new price repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Every record of every subject for `tier` that has not ended by `now`.
    ///
    /// Feeds batch resolution of list views.
    pub async fn list_live_for_tier(
        &self,
        tier: PriceTier,
        now: DateTime<Utc>,
    ) -> Result<Vec<PriceRecord>, StoreError> {
        price_records::Entity::find()
            .filter(price_records::Column::Tier.eq(tier.as_str()))
            .filter(not_ended_by(now))
            .order_by_asc(price_records::Column::EffectiveFrom)
            .all(&self.db)
            .await
            .map_err(backend)?
            .into_iter()
            .map(to_record)
            .collect()
    }
}

#[async_trait]
impl PriceStore for PriceRepository {
    async fn list_current_and_pending(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
        now: DateTime<Utc>,
    ) -> Result<Vec<PriceRecord>, StoreError> {
        price_records::Entity::find()
            .filter(subject_condition(subject, tier))
            .filter(not_ended_by(now))
            .order_by_asc(price_records::Column::EffectiveFrom)
            .all(&self.db)
            .await
            .map_err(backend)?
            .into_iter()
            .map(to_record)
            .collect()
    }

    async fn list_history(
        &self,
        subject: &SubjectKey,
        tier: PriceTier,
    ) -> Result<Vec<PriceRecord>, StoreError> {
        price_records::Entity::find()
            .filter(subject_condition(subject, tier))
            .order_by_asc(price_records::Column::EffectiveFrom)
            .all(&self.db)
            .await
            .map_err(backend)?
            .into_iter()
            .map(to_record)
            .collect()
    }

    async fn insert(&self, record: PriceRecord) -> Result<(), StoreError> {
        insert_record(&self.db, &record).await
    }

    async fn update_pending_by_id(
        &self,
        id: PriceRecordId,
        patch: PendingPatch,
    ) -> Result<PriceRecord, StoreError> {
        patch_pending(&self.db, id, &patch).await
    }

    async fn delete_pending_by_id(&self, id: PriceRecordId) -> Result<(), StoreError> {
        delete_pending(&self.db, id).await
    }

    async fn set_effective_to(&self, stamp: BoundaryStamp) -> Result<(), StoreError> {
        stamp_boundary(&self.db, stamp).await
    }

    async fn append_change_log(&self, entry: ChangeLogEntry) -> Result<(), StoreError> {
        append_entries(&self.db, vec![entry]).await
    }

    async fn list_change_log(
        &self,
        subject: &SubjectKey,
        filter: &ChangeLogFilter,
        page: &PageRequest,
    ) -> Result<PageResponse<ChangeLogEntry>, StoreError> {
        let query = price_change_logs::Entity::find().filter(change_log_condition(subject, filter));

        let total = query.clone().count(&self.db).await.map_err(backend)?;
        let rows = query
            .order_by_desc(price_change_logs::Column::ChangedAt)
            .order_by_desc(price_change_logs::Column::Id)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .map_err(backend)?;

        let data = rows
            .into_iter()
            .map(to_entry)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PageResponse::new(data, page, total))
    }

    async fn apply(&self, plan: MutationPlan) -> Result<(), StoreError> {
        if plan.is_empty() {
            return Ok(());
        }
        debug!(
            deletes = plan.deletes.len(),
            stamps = plan.stamps.len(),
            patches = plan.patches.len(),
            inserts = plan.inserts.len(),
            entries = plan.change_log.len(),
            "Applying price mutation plan"
        );

        let txn = self.db.begin().await.map_err(backend)?;

        for id in plan.deletes {
            delete_pending(&txn, id).await?;
        }
        for stamp in plan.stamps {
            stamp_boundary(&txn, stamp).await?;
        }
        for (id, patch) in plan.patches {
            patch_pending(&txn, id, &patch).await?;
        }
        for record in plan.inserts {
            insert_record(&txn, &record).await?;
        }
        append_entries(&txn, plan.change_log).await?;

        txn.commit().await.map_err(backend)?;
        Ok(())
    }
}

// ============================================================================
// Statements shared by direct calls and the plan transaction
// ============================================================================

async fn insert_record<C: ConnectionTrait>(
    conn: &C,
    record: &PriceRecord,
) -> Result<(), StoreError> {
    let model = price_records::ActiveModel {
        id: Set(record.id.into_inner()),
        product_id: Set(record.subject.product_id.into_inner()),
        organization_id: Set(record.subject.organization_id.map(OrganizationId::into_inner)),
        tier: Set(record.tier.as_str().to_string()),
        amounts: Set(amounts_json(&record.amounts)?),
        exchange_rate: Set(record.exchange_rate),
        effective_from: Set(record.effective_from.fixed_offset()),
        effective_to: Set(record.effective_to.map(|to| to.fixed_offset())),
        source: Set(record.source.as_str().to_string()),
        change_reason: Set(record.change_reason.clone()),
        changed_by: Set(record.changed_by.map(UserId::into_inner)),
        created_at: Set(record.created_at.fixed_offset()),
    };
    model
        .insert(conn)
        .await
        .map_err(|err| write_err(err, record.subject, record.tier))?;
    Ok(())
}

async fn find_record<C: ConnectionTrait>(
    conn: &C,
    id: PriceRecordId,
    open_only: bool,
) -> Result<price_records::Model, StoreError> {
    let mut query = price_records::Entity::find_by_id(id.into_inner());
    if open_only {
        query = query.filter(price_records::Column::EffectiveTo.is_null());
    }
    query
        .one(conn)
        .await
        .map_err(backend)?
        .ok_or(StoreError::NotFound(id))
}

async fn patch_pending<C: ConnectionTrait>(
    conn: &C,
    id: PriceRecordId,
    patch: &PendingPatch,
) -> Result<PriceRecord, StoreError> {
    let model = find_record(conn, id, true).await?;
    let existing = to_record(model.clone())?;

    let mut active: price_records::ActiveModel = model.into();
    active.amounts = Set(amounts_json(&patch.amounts)?);
    active.exchange_rate = Set(patch.exchange_rate);
    active.effective_from = Set(patch.effective_from.fixed_offset());
    active.source = Set(patch.source.as_str().to_string());
    active.change_reason = Set(patch.change_reason.clone());
    active.changed_by = Set(patch.changed_by.map(UserId::into_inner));

    let updated = active
        .update(conn)
        .await
        .map_err(|err| write_err(err, existing.subject, existing.tier))?;
    to_record(updated)
}

async fn delete_pending<C: ConnectionTrait>(conn: &C, id: PriceRecordId) -> Result<(), StoreError> {
    let result = price_records::Entity::delete_many()
        .filter(price_records::Column::Id.eq(id.into_inner()))
        .filter(price_records::Column::EffectiveTo.is_null())
        .exec(conn)
        .await
        .map_err(backend)?;
    if result.rows_affected == 0 {
        return Err(StoreError::NotFound(id));
    }
    Ok(())
}

async fn stamp_boundary<C: ConnectionTrait>(
    conn: &C,
    stamp: BoundaryStamp,
) -> Result<(), StoreError> {
    let model = find_record(conn, stamp.id, false).await?;
    let record = to_record(model.clone())?;

    let mut active: price_records::ActiveModel = model.into();
    active.effective_to = Set(stamp.effective_to.map(|to| to.fixed_offset()));
    active
        .update(conn)
        .await
        .map_err(|err| write_err(err, record.subject, record.tier))?;
    Ok(())
}

async fn append_entries<C: ConnectionTrait>(
    conn: &C,
    entries: Vec<ChangeLogEntry>,
) -> Result<(), StoreError> {
    if entries.is_empty() {
        return Ok(());
    }
    price_change_logs::Entity::insert_many(entries.iter().map(entry_model))
        .exec(conn)
        .await
        .map_err(backend)?;
    Ok(())
}

// ============================================================================
// Filters
// ============================================================================

fn subject_condition(subject: &SubjectKey, tier: PriceTier) -> Condition {
    let organization = match subject.organization_id {
        Some(org) => price_records::Column::OrganizationId.eq(org.into_inner()),
        None => price_records::Column::OrganizationId.is_null(),
    };
    Condition::all()
        .add(price_records::Column::ProductId.eq(subject.product_id.into_inner()))
        .add(organization)
        .add(price_records::Column::Tier.eq(tier.as_str()))
}

fn not_ended_by(now: DateTime<Utc>) -> Condition {
    Condition::any()
        .add(price_records::Column::EffectiveTo.is_null())
        .add(price_records::Column::EffectiveTo.gt(now.fixed_offset()))
}

fn change_log_condition(subject: &SubjectKey, filter: &ChangeLogFilter) -> Condition {
    use price_change_logs::Column;

    let mut condition = Condition::all().add(Column::ProductId.eq(subject.product_id.into_inner()));
    condition = match subject.organization_id {
        Some(org) => condition.add(Column::OrganizationId.eq(org.into_inner())),
        None => condition.add(Column::OrganizationId.is_null()),
    };
    if let Some(tier) = filter.tier {
        condition = condition.add(Column::Tier.eq(tier.as_str()));
    }
    if let Some(currency) = filter.currency {
        condition = condition.add(Column::Currency.eq(currency.code()));
    }
    if let Some(change_type) = filter.change_type {
        condition = condition.add(Column::ChangeType.eq(change_type.as_str()));
    }
    if let Some(user) = filter.changed_by {
        condition = condition.add(Column::ChangedBy.eq(user.into_inner()));
    }
    if let Some(from) = filter.from {
        condition = condition.add(Column::ChangedAt.gte(from.fixed_offset()));
    }
    if let Some(to) = filter.to {
        condition = condition.add(Column::ChangedAt.lt(to.fixed_offset()));
    }
    condition
}

// ============================================================================
// Row mapping
// ============================================================================

fn backend(err: DbErr) -> StoreError {
    error!(error = %err, "Price store query failed");
    StoreError::Backend(err.to_string())
}

fn write_err(err: DbErr, subject: SubjectKey, tier: PriceTier) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            StoreError::DuplicateOpenRecord { subject, tier }
        }
        _ => backend(err),
    }
}

fn amounts_json(amounts: &PriceAmounts) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(amounts).map_err(|e| StoreError::Backend(e.to_string()))
}

fn corrupt(column: &str, value: &str) -> StoreError {
    StoreError::Backend(format!("Invalid {column} value in database: {value}"))
}

fn utc(value: DateTime<FixedOffset>) -> DateTime<Utc> {
    value.with_timezone(&Utc)
}

fn to_record(model: price_records::Model) -> Result<PriceRecord, StoreError> {
    let tier = PriceTier::parse(&model.tier).ok_or_else(|| corrupt("tier", &model.tier))?;
    let source = PriceSource::parse(&model.source).ok_or_else(|| corrupt("source", &model.source))?;
    let amounts = serde_json::from_value(model.amounts)
        .map_err(|e| StoreError::Backend(format!("Invalid amounts value in database: {e}")))?;

    Ok(PriceRecord {
        id: PriceRecordId::from_uuid(model.id),
        subject: SubjectKey {
            product_id: ProductId::from_uuid(model.product_id),
            organization_id: model.organization_id.map(OrganizationId::from_uuid),
        },
        tier,
        amounts,
        exchange_rate: model.exchange_rate,
        effective_from: utc(model.effective_from),
        effective_to: model.effective_to.map(utc),
        source,
        change_reason: model.change_reason,
        changed_by: model.changed_by.map(UserId::from_uuid),
        created_at: utc(model.created_at),
    })
}

fn entry_model(entry: &ChangeLogEntry) -> price_change_logs::ActiveModel {
    let (old_from, old_to) = window_columns(entry.old_window);
    let (new_from, new_to) = window_columns(entry.new_window);
    price_change_logs::ActiveModel {
        id: Set(entry.id.into_inner()),
        price_record_id: Set(entry.price_record_id.into_inner()),
        product_id: Set(entry.subject.product_id.into_inner()),
        organization_id: Set(entry.subject.organization_id.map(OrganizationId::into_inner)),
        tier: Set(entry.tier.as_str().to_string()),
        currency: Set(entry.currency.code().to_string()),
        change_type: Set(entry.change_type.as_str().to_string()),
        old_amount: Set(entry.old_amount),
        new_amount: Set(entry.new_amount),
        delta: Set(entry.delta),
        delta_percentage: Set(entry.delta_percentage),
        old_effective_from: Set(old_from),
        old_effective_to: Set(old_to),
        new_effective_from: Set(new_from),
        new_effective_to: Set(new_to),
        reason: Set(entry.reason.clone()),
        changed_by: Set(entry.changed_by.map(UserId::into_inner)),
        changed_at: Set(entry.changed_at.fixed_offset()),
    }
}

fn window_columns(
    window: Option<EffectiveWindow>,
) -> (Option<DateTime<FixedOffset>>, Option<DateTime<FixedOffset>>) {
    match window {
        Some(w) => (Some(w.from.fixed_offset()), w.to.map(|to| to.fixed_offset())),
        None => (None, None),
    }
}

fn window_from_columns(
    from: Option<DateTime<FixedOffset>>,
    to: Option<DateTime<FixedOffset>>,
) -> Option<EffectiveWindow> {
    from.map(|from| EffectiveWindow {
        from: utc(from),
        to: to.map(utc),
    })
}

fn to_entry(model: price_change_logs::Model) -> Result<ChangeLogEntry, StoreError> {
    let tier = PriceTier::parse(&model.tier).ok_or_else(|| corrupt("tier", &model.tier))?;
    let currency: Currency = model
        .currency
        .trim()
        .parse()
        .map_err(|_| corrupt("currency", &model.currency))?;
    let change_type = ChangeType::parse(&model.change_type)
        .ok_or_else(|| corrupt("change_type", &model.change_type))?;

    Ok(ChangeLogEntry {
        id: ChangeLogId::from_uuid(model.id),
        price_record_id: PriceRecordId::from_uuid(model.price_record_id),
        subject: SubjectKey {
            product_id: ProductId::from_uuid(model.product_id),
            organization_id: model.organization_id.map(OrganizationId::from_uuid),
        },
        tier,
        currency,
        change_type,
        old_amount: model.old_amount,
        new_amount: model.new_amount,
        delta: model.delta,
        delta_percentage: model.delta_percentage,
        old_window: window_from_columns(model.old_effective_from, model.old_effective_to),
        new_window: window_from_columns(model.new_effective_from, model.new_effective_to),
        reason: model.reason,
        changed_by: model.changed_by.map(UserId::from_uuid),
        changed_at: utc(model.changed_at),
    })
}

//! Exchange rate repository backing the rate provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricebook_core::currency::{ExchangeRateProvider, ExchangeRateRecord, RateError, find_rate};
use pricebook_shared::types::{Currency, ExchangeRateId};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};

use tracing::error;

use crate::entities::exchange_rates;

/// Exchange rate repository for rate maintenance and lookups.
#[derive(Debug, Clone)]
pub struct ExchangeRateRepository {
    db: DatabaseConnection,
}

impl ExchangeRateRepository {
    /// Creates a new exchange rate repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Stores a rate record.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Rate is not positive
    /// - A rate for the same pair and start already exists
    pub async fn add_rate(&self, record: &ExchangeRateRecord) -> Result<(), RateError> {
        if record.rate <= Decimal::ZERO {
            return Err(RateError::NonPositiveRate(record.rate));
        }

        let model = exchange_rates::ActiveModel {
            id: Set(record.id.into_inner()),
            from_currency: Set(record.from_currency.code().to_string()),
            to_currency: Set(record.to_currency.code().to_string()),
            rate: Set(record.rate),
            effective_from: Set(record.effective_from.fixed_offset()),
            effective_to: Set(record.effective_to.map(|to| to.fixed_offset())),
            approved: Set(record.approved),
            created_at: Set(Utc::now().fixed_offset()),
        };
        model.insert(&self.db).await.map_err(backend)?;
        Ok(())
    }

    /// Every stored rate between `a` and `b`, in either direction, that
    /// started on or before `as_of`.
    pub async fn rates_between(
        &self,
        a: Currency,
        b: Currency,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<ExchangeRateRecord>, RateError> {
        let pair = |from: Currency, to: Currency| {
            Condition::all()
                .add(exchange_rates::Column::FromCurrency.eq(from.code()))
                .add(exchange_rates::Column::ToCurrency.eq(to.code()))
        };

        exchange_rates::Entity::find()
            .filter(Condition::any().add(pair(a, b)).add(pair(b, a)))
            .filter(exchange_rates::Column::EffectiveFrom.lte(as_of.fixed_offset()))
            .order_by_desc(exchange_rates::Column::EffectiveFrom)
            .all(&self.db)
            .await
            .map_err(backend)?
            .into_iter()
            .map(to_record)
            .collect()
    }
}

#[async_trait]
impl ExchangeRateProvider for ExchangeRateRepository {
    async fn get_rate(
        &self,
        from: Currency,
        to: Currency,
        as_of: DateTime<Utc>,
    ) -> Result<Decimal, RateError> {
        let records = if from == to {
            Vec::new()
        } else {
            self.rates_between(from, to, as_of).await?
        };
        find_rate(&records, from, to, as_of)
            .map(|lookup| lookup.rate)
            .ok_or(RateError::NotFound { from, to, as_of })
    }
}

fn backend(err: DbErr) -> RateError {
    error!(error = %err, "Exchange rate query failed");
    RateError::Backend(err.to_string())
}

fn to_record(model: exchange_rates::Model) -> Result<ExchangeRateRecord, RateError> {
    let currency = |code: &str| {
        code.trim()
            .parse::<Currency>()
            .map_err(|e| RateError::Backend(format!("Invalid currency in database: {e}")))
    };

    Ok(ExchangeRateRecord {
        id: ExchangeRateId::from_uuid(model.id),
        from_currency: currency(&model.from_currency)?,
        to_currency: currency(&model.to_currency)?,
        rate: model.rate,
        effective_from: model.effective_from.with_timezone(&Utc),
        effective_to: model.effective_to.map(|to| to.with_timezone(&Utc)),
        approved: model.approved,
    })
}

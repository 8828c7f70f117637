//! Database layer with `SeaORM` entities and repositories.
//!
//! This crate provides:
//! - `SeaORM` entity definitions
//! - The PostgreSQL price store and exchange rate provider
//! - Database migrations

pub mod entities;
pub mod migration;
pub mod repositories;

pub use repositories::{ExchangeRateRepository, PriceRepository};

use pricebook_core::pricing::{PriceMutationService, PricingError, SystemClock};
use pricebook_shared::PricingConfig;
use pricebook_shared::config::DatabaseConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Price mutation service over PostgreSQL and the wall clock.
pub type PgPriceService =
    PriceMutationService<PriceRepository, ExchangeRateRepository, SystemClock>;

/// Establishes a connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(database_url).await
}

/// Establishes a pooled connection sized by `config`.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect_with(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .sqlx_logging(false);
    Database::connect(options).await
}

/// Builds the price mutation service over `db`.
///
/// # Errors
///
/// Returns an error if the configured business timezone offset is invalid.
pub fn price_service(
    db: &DatabaseConnection,
    config: &PricingConfig,
) -> Result<PgPriceService, PricingError> {
    PriceMutationService::from_config(
        PriceRepository::new(db.clone()),
        ExchangeRateRepository::new(db.clone()),
        SystemClock,
        config,
    )
}

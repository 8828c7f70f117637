//! Database seeder for Pricebook development and testing.
//!
//! Seeds the CNY to IDR exchange rate and a demo product with an active
//! list price so the service has something to resolve against.
//!
//! Usage: cargo run --bin seeder

use chrono::{TimeZone, Utc};
use pricebook_core::currency::ExchangeRateRecord;
use pricebook_core::pricing::{PriceAmounts, PriceSource, PriceTier};
use pricebook_db::entities::{exchange_rates, price_records};
use pricebook_db::migration::Migrator;
use pricebook_db::ExchangeRateRepository;
use pricebook_shared::AppConfig;
use pricebook_shared::types::{Currency, ExchangeRateId};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use sea_orm_migration::MigratorTrait;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Seeded CNY to IDR rate ID (consistent for all seeds)
const CNY_IDR_RATE_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0001);
/// Demo product ID (consistent for all seeds)
const DEMO_PRODUCT_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0002);
/// Demo product's active list price record ID
const DEMO_PRICE_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0003);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pricebook=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;

    println!("Connecting to database...");
    let db = pricebook_db::connect_with(&config.database).await?;
    Migrator::up(&db, None).await?;
    info!("Database migrated");

    println!("Seeding exchange rates...");
    seed_exchange_rates(&db).await?;

    println!("Seeding demo product price...");
    seed_demo_price(&db).await?;

    println!("Seeding complete!");
    Ok(())
}

/// Seeds the CNY to IDR rate used by currency linkage.
async fn seed_exchange_rates(db: &DatabaseConnection) -> anyhow::Result<()> {
    if exchange_rates::Entity::find_by_id(CNY_IDR_RATE_ID)
        .one(db)
        .await?
        .is_some()
    {
        println!("  CNY/IDR rate already exists, skipping...");
        return Ok(());
    }

    let effective_from = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| anyhow::anyhow!("invalid seed rate start"))?;
    let record = ExchangeRateRecord {
        id: ExchangeRateId::from_uuid(CNY_IDR_RATE_ID),
        ..ExchangeRateRecord::new(
            Currency::Cny,
            Currency::Idr,
            Decimal::new(15_400, 0),
            effective_from,
        )
    };
    ExchangeRateRepository::new(db.clone())
        .add_rate(&record)
        .await?;

    println!("  Created CNY/IDR rate 15400");
    Ok(())
}

/// Seeds an open-ended list price for the demo product.
async fn seed_demo_price(db: &DatabaseConnection) -> anyhow::Result<()> {
    if price_records::Entity::find_by_id(DEMO_PRICE_ID)
        .one(db)
        .await?
        .is_some()
    {
        println!("  Demo price already exists, skipping...");
        return Ok(());
    }

    let amounts = PriceAmounts::new()
        .with(Currency::Cny, Decimal::new(100, 0))
        .with(Currency::Idr, Decimal::new(1_540_000, 0));
    let now = Utc::now().fixed_offset();

    let price = price_records::ActiveModel {
        id: Set(DEMO_PRICE_ID),
        product_id: Set(DEMO_PRODUCT_ID),
        organization_id: Set(None),
        tier: Set(PriceTier::List.as_str().to_string()),
        amounts: Set(serde_json::to_value(&amounts)?),
        exchange_rate: Set(Some(Decimal::new(15_400, 0))),
        effective_from: Set(now),
        effective_to: Set(None),
        source: Set(PriceSource::Import.as_str().to_string()),
        change_reason: Set(Some("Seed data".to_string())),
        changed_by: Set(None),
        created_at: Set(now),
    };
    price.insert(db).await?;

    println!("  Created list price for product {DEMO_PRODUCT_ID}");
    Ok(())
}

//! Drops the precision limits on change log amounts.
//!
//! Amounts live in a JSON column on `price_records` and carry no precision
//! limit there, so the change log columns derived from them must not either.
//! A 0.01 to 100,000,000 edit alone yields a delta percentage of
//! 999,999,999,900.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(WIDEN_SQL)
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(NARROW_SQL)
            .await?;
        Ok(())
    }
}

const WIDEN_SQL: &str = r"
ALTER TABLE price_change_logs
    ALTER COLUMN old_amount TYPE NUMERIC,
    ALTER COLUMN new_amount TYPE NUMERIC,
    ALTER COLUMN delta TYPE NUMERIC,
    ALTER COLUMN delta_percentage TYPE NUMERIC;
";

const NARROW_SQL: &str = r"
ALTER TABLE price_change_logs
    ALTER COLUMN old_amount TYPE NUMERIC(20, 4),
    ALTER COLUMN new_amount TYPE NUMERIC(20, 4),
    ALTER COLUMN delta TYPE NUMERIC(20, 4),
    ALTER COLUMN delta_percentage TYPE NUMERIC(12, 2);
";

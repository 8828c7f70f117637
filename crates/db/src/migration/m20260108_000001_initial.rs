//! Initial database migration.
//!
//! Creates the price record, change log and exchange rate tables together
//! with the indexes and triggers that back the versioning rules.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: VERSIONED PRICES
        // ============================================================
        db.execute_unprepared(PRICE_RECORDS_SQL).await?;

        // ============================================================
        // PART 2: AUDIT TRAIL
        // ============================================================
        db.execute_unprepared(PRICE_CHANGE_LOGS_SQL).await?;

        // ============================================================
        // PART 3: CURRENCY MANAGEMENT
        // ============================================================
        db.execute_unprepared(EXCHANGE_RATES_SQL).await?;

        // ============================================================
        // PART 4: TRIGGERS & FUNCTIONS
        // ============================================================
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const PRICE_RECORDS_SQL: &str = r"
CREATE TABLE price_records (
    id UUID PRIMARY KEY,
    product_id UUID NOT NULL,
    organization_id UUID,
    tier VARCHAR(16) NOT NULL,
    amounts JSONB NOT NULL,
    exchange_rate NUMERIC(20, 6),
    effective_from TIMESTAMPTZ NOT NULL,
    effective_to TIMESTAMPTZ,
    source VARCHAR(16) NOT NULL DEFAULT 'manual',
    change_reason TEXT,
    changed_by UUID,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_price_tier CHECK (tier IN ('cost', 'channel', 'direct', 'list')),
    CONSTRAINT chk_price_source CHECK (source IN ('manual', 'import', 'api', 'legacy')),
    CONSTRAINT chk_price_window CHECK (effective_to IS NULL OR effective_to > effective_from),
    CONSTRAINT chk_price_rate_positive CHECK (exchange_rate IS NULL OR exchange_rate > 0)
);

-- At most one open-ended record per subject and tier
CREATE UNIQUE INDEX uq_price_records_open ON price_records(
    product_id,
    COALESCE(organization_id, '00000000-0000-0000-0000-000000000000'::uuid),
    tier
) WHERE effective_to IS NULL;

-- Resolution and history lookups
CREATE INDEX idx_price_records_subject ON price_records(product_id, organization_id, tier, effective_from);
";

const PRICE_CHANGE_LOGS_SQL: &str = r"
CREATE TABLE price_change_logs (
    id UUID PRIMARY KEY,
    price_record_id UUID NOT NULL,
    product_id UUID NOT NULL,
    organization_id UUID,
    tier VARCHAR(16) NOT NULL,
    currency CHAR(3) NOT NULL,
    change_type VARCHAR(16) NOT NULL,
    old_amount NUMERIC(20, 4),
    new_amount NUMERIC(20, 4),
    delta NUMERIC(20, 4) NOT NULL,
    delta_percentage NUMERIC(12, 2),
    old_effective_from TIMESTAMPTZ,
    old_effective_to TIMESTAMPTZ,
    new_effective_from TIMESTAMPTZ,
    new_effective_to TIMESTAMPTZ,
    reason TEXT,
    changed_by UUID,
    changed_at TIMESTAMPTZ NOT NULL,
    CONSTRAINT chk_change_type CHECK (change_type IN ('create', 'update', 'delete', 'activate', 'deactivate'))
);

-- Entries outlive deleted pending records, so no foreign key to price_records
CREATE INDEX idx_price_change_logs_subject ON price_change_logs(product_id, organization_id, changed_at DESC, id DESC);
CREATE INDEX idx_price_change_logs_record ON price_change_logs(price_record_id);
";

const EXCHANGE_RATES_SQL: &str = r"
CREATE TABLE exchange_rates (
    id UUID PRIMARY KEY,
    from_currency CHAR(3) NOT NULL,
    to_currency CHAR(3) NOT NULL,
    rate NUMERIC(20, 10) NOT NULL,
    effective_from TIMESTAMPTZ NOT NULL,
    effective_to TIMESTAMPTZ,
    approved BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_rate_positive CHECK (rate > 0),
    CONSTRAINT chk_different_currencies CHECK (from_currency <> to_currency),
    CONSTRAINT chk_rate_window CHECK (effective_to IS NULL OR effective_to > effective_from),
    UNIQUE (from_currency, to_currency, effective_from)
);

CREATE INDEX idx_exchange_rates_lookup ON exchange_rates(from_currency, to_currency, effective_from DESC);
";

const TRIGGERS_SQL: &str = r"
-- Change log entries are write-once
CREATE OR REPLACE FUNCTION reject_change_log_mutation()
RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'price_change_logs is append-only';
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_price_change_logs_immutable
    BEFORE UPDATE OR DELETE ON price_change_logs
    FOR EACH ROW EXECUTE FUNCTION reject_change_log_mutation();
";

const DROP_ALL_SQL: &str = r"
DROP TRIGGER IF EXISTS trg_price_change_logs_immutable ON price_change_logs;
DROP FUNCTION IF EXISTS reject_change_log_mutation();
DROP TABLE IF EXISTS exchange_rates CASCADE;
DROP TABLE IF EXISTS price_change_logs CASCADE;
DROP TABLE IF EXISTS price_records CASCADE;
";

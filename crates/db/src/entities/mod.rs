//! `SeaORM` entity definitions.

pub mod prelude;

pub mod exchange_rates;
pub mod price_change_logs;
pub mod price_records;

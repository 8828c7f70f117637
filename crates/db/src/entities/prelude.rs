//! Entity re-exports.

pub use super::exchange_rates::Entity as ExchangeRates;
pub use super::price_change_logs::Entity as PriceChangeLogs;
pub use super::price_records::Entity as PriceRecords;

//! Repository abstractions for data access.
//!
//! Repositories implement the core persistence and rate provider traits,
//! hiding the `SeaORM` implementation details from the rest of the application.

pub mod exchange_rate;
pub mod price;

pub use exchange_rate::ExchangeRateRepository;
pub use price::PriceRepository;

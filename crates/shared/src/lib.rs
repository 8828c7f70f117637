//! Shared types, errors, and configuration for Pricebook.
//!
//! This crate provides common types used across all other crates:
//! - Currency codes with minor-unit metadata
//! - Typed IDs for type-safe entity references
//! - Pagination for change log listings
//! - Application-wide error types
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, PricingConfig};
pub use error::{AppError, AppResult};

//! Core price versioning logic for Pricebook.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! All domain types, invariants, and calculations live here; persistence and
//! exchange rate feeds are reached through the collaborator traits.
//!
//! # Modules
//!
//! - `currency` - Exchange rates, conversion rounding, and currency linkage
//! - `pricing` - Effective-dated price records, resolution, mutation, and audit

pub mod currency;
pub mod pricing;

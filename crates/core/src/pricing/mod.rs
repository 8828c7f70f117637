//! Effective-dated price versioning.
//!
//! This module provides:
//! - Price records with derived lifecycle state
//! - Temporal resolution of the current and pending price
//! - The mutation service enforcing the single-pending and non-overlap rules
//! - The change log recorder
//! - Persistence and draft storage interfaces with in-memory adapters

pub mod cache;
pub mod changelog;
pub mod clock;
pub mod draft;
pub mod error;
pub mod resolver;
pub mod service;
pub mod store;
pub mod timezone;
pub mod types;

#[cfg(test)]
mod resolver_props;
#[cfg(test)]
mod service_props;

pub use cache::ResolutionCache;
pub use changelog::{
    ChangeContext, ChangeLogEntry, ChangeLogFilter, ChangeLogRecorder, ChangeType,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use draft::{
    Draft, DraftError, DraftKey, DraftStore, InMemoryDraftStore, JsonFileDraftStore, PriceDraft,
};
pub use error::{ErrorKind, PricingError};
pub use resolver::{InvariantViolation, ResolveRequest, TemporalResolver};
pub use service::{MutationMeta, PendingPriceInput, PriceMutationService, PricingPolicy};
pub use store::{
    BoundaryStamp, InMemoryPriceStore, MutationPlan, PendingPatch, PriceStore, StoreError,
};
pub use timezone::{BusinessTimezone, TimezoneError};
pub use types::{
    EffectiveWindow, PriceAmounts, PriceRecord, PriceSource, PriceState, PriceTier, ResolvedPrice,
    SubjectKey,
};

//! Pricing error types.
//!
//! Every mutation failure maps onto one of three caller-facing kinds:
//! conflicts with the versioned record set, invalid input, and missing
//! collaborator data. Storage failures are internal.

use chrono::{DateTime, Utc};
use pricebook_shared::AppError;
use pricebook_shared::types::{Currency, PriceRecordId};
use rust_decimal::Decimal;
use thiserror::Error;

use super::store::StoreError;
use super::timezone::TimezoneError;
use super::types::PriceTier;
use crate::currency::{LinkageOverflow, RateError};

/// Caller-facing error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request contradicts the current state of the record set.
    Conflict,
    /// The request itself is malformed.
    Validation,
    /// A collaborator has no data for the request.
    NotFound,
    /// Backend failure.
    Internal,
}

/// Errors that can occur during price versioning operations.
#[derive(Debug, Error)]
pub enum PricingError {
    /// The requested boundary instant is not in the future.
    #[error("Requested instant {requested} must be after the current instant {now}")]
    NotInFuture {
        /// Requested boundary.
        requested: DateTime<Utc>,
        /// Reference instant.
        now: DateTime<Utc>,
    },

    /// The requested boundary is before the next business day.
    #[error("Requested instant {requested} is earlier than the next business day {earliest}")]
    BeforeNextBusinessDay {
        /// Requested boundary.
        requested: DateTime<Utc>,
        /// Earliest accepted start.
        earliest: DateTime<Utc>,
    },

    /// The record has already become active and is immutable.
    #[error("Price record {id} became active at {effective_from} and can no longer be changed")]
    AlreadyActive {
        /// The record.
        id: PriceRecordId,
        /// When it became active.
        effective_from: DateTime<Utc>,
    },

    /// A pending record blocks the operation.
    #[error("Pending price record {id} is already scheduled for this tier")]
    PendingExists {
        /// The pending record.
        id: PriceRecordId,
    },

    /// No record is in effect for the subject and tier.
    #[error("No active {tier} price for this subject")]
    NoActiveRecord {
        /// The tier.
        tier: PriceTier,
    },

    /// The active record already has a scheduled close.
    #[error("Price record {id} is already scheduled to end at {effective_to}")]
    AlreadyClosed {
        /// The record.
        id: PriceRecordId,
        /// Its scheduled end.
        effective_to: DateTime<Utc>,
    },

    /// The active record has no scheduled close to cancel.
    #[error("Price record {id} has no scheduled end")]
    NotClosed {
        /// The record.
        id: PriceRecordId,
    },

    /// Another writer changed the record set first.
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// No currency carries a value.
    #[error("At least one currency amount is required")]
    NoAmounts,

    /// A currency amount is negative.
    #[error("Amount for {currency} must not be negative, got {amount}")]
    NegativeAmount {
        /// The currency.
        currency: Currency,
        /// The amount.
        amount: Decimal,
    },

    /// A derived or converted amount does not fit in a `Decimal`.
    #[error("Amount for {currency} is out of range")]
    AmountOutOfRange {
        /// The currency whose amount overflowed.
        currency: Currency,
    },

    /// The exchange rate is zero or negative.
    #[error("Exchange rate must be positive, got {0}")]
    NonPositiveRate(Decimal),

    /// The subject key is malformed or incomplete.
    #[error("Invalid subject key: {0}")]
    InvalidSubjectKey(String),

    /// A local timestamp could not be interpreted.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// The record does not exist for this subject and tier.
    #[error("Price record {0} not found")]
    RecordNotFound(PriceRecordId),

    /// No exchange rate applies for the pair at the instant.
    #[error("No exchange rate found for {from}/{to} as of {as_of}")]
    RateNotFound {
        /// Source currency.
        from: Currency,
        /// Target currency.
        to: Currency,
        /// Instant of the lookup.
        as_of: DateTime<Utc>,
    },

    /// The exchange rate backend failed.
    #[error("Exchange rate backend error: {0}")]
    RateBackend(String),

    /// The persistence backend failed.
    #[error("Storage error: {0}")]
    Store(String),
}

impl PricingError {
    /// Returns the caller-facing error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInFuture { .. }
            | Self::BeforeNextBusinessDay { .. }
            | Self::AlreadyActive { .. }
            | Self::PendingExists { .. }
            | Self::NoActiveRecord { .. }
            | Self::AlreadyClosed { .. }
            | Self::NotClosed { .. }
            | Self::ConcurrentModification(_) => ErrorKind::Conflict,

            Self::NoAmounts
            | Self::NegativeAmount { .. }
            | Self::AmountOutOfRange { .. }
            | Self::NonPositiveRate(_)
            | Self::InvalidSubjectKey(_)
            | Self::InvalidTimestamp(_) => ErrorKind::Validation,

            Self::RecordNotFound(_) | Self::RateNotFound { .. } => ErrorKind::NotFound,

            Self::RateBackend(_) | Self::Store(_) => ErrorKind::Internal,
        }
    }

    /// Returns true for conflicts with the current record set.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Conflict => 409,
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Internal => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotInFuture { .. } => "NOT_IN_FUTURE",
            Self::BeforeNextBusinessDay { .. } => "BEFORE_NEXT_BUSINESS_DAY",
            Self::AlreadyActive { .. } => "PRICE_ALREADY_ACTIVE",
            Self::PendingExists { .. } => "PENDING_PRICE_EXISTS",
            Self::NoActiveRecord { .. } => "NO_ACTIVE_PRICE",
            Self::AlreadyClosed { .. } => "PRICE_ALREADY_CLOSED",
            Self::NotClosed { .. } => "PRICE_NOT_CLOSED",
            Self::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            Self::NoAmounts => "NO_AMOUNTS",
            Self::NegativeAmount { .. } => "NEGATIVE_AMOUNT",
            Self::AmountOutOfRange { .. } => "AMOUNT_OUT_OF_RANGE",
            Self::NonPositiveRate(_) => "NON_POSITIVE_RATE",
            Self::InvalidSubjectKey(_) => "INVALID_SUBJECT_KEY",
            Self::InvalidTimestamp(_) => "INVALID_TIMESTAMP",
            Self::RecordNotFound(_) => "PRICE_RECORD_NOT_FOUND",
            Self::RateNotFound { .. } => "EXCHANGE_RATE_NOT_FOUND",
            Self::RateBackend(_) => "EXCHANGE_RATE_BACKEND_ERROR",
            Self::Store(_) => "STORAGE_ERROR",
        }
    }
}

impl From<RateError> for PricingError {
    fn from(err: RateError) -> Self {
        match err {
            RateError::NotFound { from, to, as_of } => Self::RateNotFound { from, to, as_of },
            RateError::NonPositiveRate(rate) => Self::NonPositiveRate(rate),
            RateError::OutOfRange { to } => Self::AmountOutOfRange { currency: to },
            RateError::Backend(msg) => Self::RateBackend(msg),
        }
    }
}

impl From<LinkageOverflow> for PricingError {
    fn from(err: LinkageOverflow) -> Self {
        Self::AmountOutOfRange {
            currency: err.currency,
        }
    }
}

impl From<StoreError> for PricingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateOpenRecord { .. } => Self::ConcurrentModification(err.to_string()),
            StoreError::NotFound(id) => Self::RecordNotFound(id),
            StoreError::Backend(msg) => Self::Store(msg),
        }
    }
}

impl From<TimezoneError> for PricingError {
    fn from(err: TimezoneError) -> Self {
        Self::InvalidTimestamp(err.to_string())
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Conflict if matches!(err, PricingError::ConcurrentModification(_)) => {
                Self::ConcurrentModification(message)
            }
            ErrorKind::Conflict => Self::Conflict(message),
            ErrorKind::Validation => Self::Validation(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Internal => match err {
                PricingError::RateBackend(_) => Self::ExternalService(message),
                _ => Self::Database(message),
            },
        }
    }
}

//! Application-wide error types.
//!
//! Domain errors from the pricing engine collapse into [`AppError`] at the
//! edge of the service so callers see one status/code vocabulary.

use thiserror::Error;

/// Result type alias using `AppError`.
pub type AppResult<T> = Result<T, AppError>;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// A price record, subject or exchange rate does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input was rejected before any state was read.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The request contradicts the current version history.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Another writer changed the same subject first.
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Persistence failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Exchange rate feed failure.
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP-style status code.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Conflict(_) | Self::ConcurrentModification(_) => 409,
            Self::ExternalService(_) => 502,
            Self::Database(_) | Self::Internal(_) => 500,
        }
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            Self::Database(_) => "DATABASE_ERROR",
            Self::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether repeating the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentModification(_) | Self::ExternalService(_)
        )
    }
}

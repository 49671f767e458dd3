//! Error taxonomy for the scheduler domain.
//!
//! Each variant maps to exactly one HTTP status at the adapter boundary
//! (see `adapters::http::error`); the mapping lives there so this type
//! stays transport-agnostic.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication/authorization error: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("contention, retry: {0}")]
    Contention(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SchedulerError {
    /// Whether a single internal retry is appropriate before surfacing
    /// the error to the caller. Only row-level CAS contention qualifies.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Contention(_))
    }

    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Auth(_) | Self::NotFound(_) | Self::Conflict(_))
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

//! Error types for the wallet service.

use crate::domain::{TransactionId, TransactionKind, TransactionState};

/// Domain-level errors (business rule violations).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: i64, required: i64 },

    #[error("Invalid {kind} transition {from} -> {to}")]
    InvalidTransition {
        kind: TransactionKind,
        from: TransactionState,
        to: TransactionState,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    /// Optimistic concurrency check failed; re-read and retry.
    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: i64, actual: i64 },

    /// The posting leg was already applied for this transaction.
    #[error("Posting already applied")]
    DuplicatePosting,

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Application-level errors, surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transaction {id} cannot be confirmed in state {state}")]
    NotConfirmable {
        id: TransactionId,
        state: TransactionState,
    },

    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: i64, required: i64 },

    #[error("Capture failed for {id}: {reason}")]
    CaptureFailed { id: TransactionId, reason: String },

    #[error("Send failed for {id}: {reason}")]
    SendFailed { id: TransactionId, reason: String },

    /// Contention that outlived the bounded retries; safe to retry.
    #[error("Temporarily unavailable: {0}")]
    Busy(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InsufficientFunds {
                available,
                required,
            } => AppError::InsufficientFunds {
                available,
                required,
            },
            DomainError::InvalidTransition { .. } => AppError::Internal(err.to_string()),
            e => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::VersionConflict { .. } | RepoError::DuplicatePosting => {
                AppError::Busy(err.to_string())
            }
            RepoError::Conflict(e) => AppError::Busy(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_surfaces_verbatim() {
        let err: AppError = RepoError::Domain(DomainError::InsufficientFunds {
            available: 10,
            required: 12,
        })
        .into();
        assert!(matches!(
            err,
            AppError::InsufficientFunds {
                available: 10,
                required: 12
            }
        ));
    }

    #[test]
    fn test_conflicts_are_transient() {
        let err: AppError = RepoError::VersionConflict {
            expected: 1,
            actual: 2,
        }
        .into();
        assert!(matches!(err, AppError::Busy(_)));
    }

    #[test]
    fn test_invalid_amount_is_bad_request() {
        let err: AppError = DomainError::InvalidAmount(0).into();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}

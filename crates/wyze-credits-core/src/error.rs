//! Error types for wyze-credits.

use crate::ids::IdError;

/// Result type for wyze-credits operations.
pub type Result<T> = std::result::Result<T, CreditsError>;

/// Errors that can occur in ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum CreditsError {
    /// The user has no credit balance row.
    #[error("user not found: {user_id}")]
    UserNotFound {
        /// The user ID that was not found.
        user_id: String,
    },

    /// The debit exceeds the available credits.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Credits available before the debit.
        available: i64,
        /// Credits the operation asked for.
        required: i64,
    },

    /// A credit amount was zero or negative.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The underlying store failed.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl CreditsError {
    /// Check that a credit quantity is strictly positive.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::InvalidAmount` if `value <= 0`.
    pub fn require_positive(field: &str, value: i64) -> Result<i64> {
        if value > 0 {
            Ok(value)
        } else {
            Err(Self::InvalidAmount(format!(
                "{field} must be positive, got {value}"
            )))
        }
    }

    /// A grant or debit that would push a credit counter past `i64::MAX`.
    #[must_use]
    pub fn counter_overflow() -> Self {
        Self::InvalidAmount("credit counters would overflow".to_string())
    }
}

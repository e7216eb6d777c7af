//! Result envelopes returned to callers of the mutating operations.
//!
//! Callers of `trackUsage` and `addCredits` never see a raw store error:
//! every failure is folded into `{ success: false, error }` with a short,
//! stable message. The failure kind is kept alongside so the HTTP layer can
//! pick a status code.

use axum::http::StatusCode;
use serde::Serialize;

use wyze_credits_core::{CreditsError, Result};

use crate::ledger::{CreditReceipt, UsageReceipt};

/// Message for a debit against a user without a balance row.
pub const USER_NOT_FOUND: &str = "User not found";
/// Message for a debit exceeding the available credits.
pub const INSUFFICIENT_CREDITS: &str = "Insufficient credits";
/// Message for any other `trackUsage` failure.
pub const TRACK_USAGE_FAILED: &str = "Failed to track usage";
/// Message for any other `addCredits` failure.
pub const ADD_CREDITS_FAILED: &str = "Failed to add credits";

/// Why an operation failed, as far as the caller is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The user has no balance row.
    UserNotFound,
    /// The debit exceeded the balance.
    InsufficientCredits,
    /// The request itself was malformed.
    InvalidInput,
    /// The store failed.
    Internal,
}

impl FailureKind {
    /// HTTP status for this failure.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
            Self::InvalidInput => StatusCode::BAD_REQUEST,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&CreditsError> for FailureKind {
    fn from(err: &CreditsError) -> Self {
        match err {
            CreditsError::UserNotFound { .. } => Self::UserNotFound,
            CreditsError::InsufficientCredits { .. } => Self::InsufficientCredits,
            CreditsError::InvalidAmount(_) | CreditsError::InvalidId(_) => Self::InvalidInput,
            CreditsError::Persistence(_) => Self::Internal,
        }
    }
}

// ============================================================================
// trackUsage
// ============================================================================

/// Envelope for `trackUsage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackUsageResult {
    /// Whether the debit was committed.
    pub success: bool,
    /// Available credits after the call.
    ///
    /// On insufficient credits this is the untouched balance, otherwise `0`
    /// for failures.
    pub remaining_credits: i64,
    /// Ledger row written on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    failure: Option<FailureKind>,
}

impl TrackUsageResult {
    /// The failure kind, `None` on success.
    #[must_use]
    pub const fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    /// HTTP status for this envelope.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.failure.map_or(StatusCode::OK, FailureKind::status)
    }

    fn failed(kind: FailureKind, remaining_credits: i64, message: impl Into<String>) -> Self {
        Self {
            success: false,
            remaining_credits,
            transaction_id: None,
            error: Some(message.into()),
            failure: Some(kind),
        }
    }
}

impl From<Result<UsageReceipt>> for TrackUsageResult {
    fn from(result: Result<UsageReceipt>) -> Self {
        match result {
            Ok(receipt) => Self {
                success: true,
                remaining_credits: receipt.remaining_credits,
                transaction_id: Some(receipt.transaction_id.to_string()),
                error: None,
                failure: None,
            },
            Err(err) => {
                let kind = FailureKind::from(&err);
                match err {
                    CreditsError::UserNotFound { .. } => Self::failed(kind, 0, USER_NOT_FOUND),
                    CreditsError::InsufficientCredits { available, .. } => {
                        Self::failed(kind, available, INSUFFICIENT_CREDITS)
                    }
                    CreditsError::InvalidAmount(_) | CreditsError::InvalidId(_) => {
                        Self::failed(kind, 0, err.to_string())
                    }
                    CreditsError::Persistence(_) => Self::failed(kind, 0, TRACK_USAGE_FAILED),
                }
            }
        }
    }
}

// ============================================================================
// addCredits
// ============================================================================

/// Envelope for `addCredits`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCreditsResult {
    /// Whether the grant was committed.
    pub success: bool,
    /// Available credits after the grant, `0` on failure.
    pub new_balance: i64,
    /// Ledger row written on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    failure: Option<FailureKind>,
}

impl AddCreditsResult {
    /// The failure kind, `None` on success.
    #[must_use]
    pub const fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    /// HTTP status for this envelope.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.failure.map_or(StatusCode::OK, FailureKind::status)
    }
}

impl From<Result<CreditReceipt>> for AddCreditsResult {
    fn from(result: Result<CreditReceipt>) -> Self {
        match result {
            Ok(receipt) => Self {
                success: true,
                new_balance: receipt.new_balance,
                transaction_id: Some(receipt.transaction_id.to_string()),
                error: None,
                failure: None,
            },
            Err(err) => {
                let (kind, message) = match &err {
                    CreditsError::InvalidAmount(_) | CreditsError::InvalidId(_) => {
                        (FailureKind::InvalidInput, err.to_string())
                    }
                    _ => (FailureKind::Internal, ADD_CREDITS_FAILED.to_string()),
                };
                Self {
                    success: false,
                    new_balance: 0,
                    transaction_id: None,
                    error: Some(message),
                    failure: Some(kind),
                }
            }
        }
    }
}

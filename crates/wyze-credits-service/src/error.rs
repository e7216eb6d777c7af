//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use wyze_credits_core::CreditsError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Insufficient credits.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Credits available.
        available: i64,
        /// Credits required.
        required: i64,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::InsufficientCredits {
                available,
                required,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                self.to_string(),
                Some(serde_json::json!({
                    "available": available,
                    "required": required
                })),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<CreditsError> for ApiError {
    fn from(err: CreditsError) -> Self {
        match err {
            CreditsError::UserNotFound { user_id } => {
                Self::NotFound(format!("credit balance not found: {user_id}"))
            }
            CreditsError::InsufficientCredits {
                available,
                required,
            } => Self::InsufficientCredits {
                available,
                required,
            },
            CreditsError::InvalidAmount(_) | CreditsError::InvalidId(_) => {
                Self::BadRequest(err.to_string())
            }
            CreditsError::Persistence(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credits_errors_map_to_statuses() {
        let cases = [
            (
                CreditsError::UserNotFound {
                    user_id: "u1".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                CreditsError::InsufficientCredits {
                    available: 1,
                    required: 2,
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                CreditsError::InvalidAmount("required must be positive, got 0".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                CreditsError::Persistence("pool timed out".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}

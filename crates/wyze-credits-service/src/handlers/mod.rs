//! API handlers.

pub mod admin;
pub mod credits;
pub mod health;
pub mod usage;

use wyze_credits_core::UserId;

use crate::error::ApiError;

/// Parse a user ID supplied in a request body or path.
pub(crate) fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid user ID: {e}")))
}

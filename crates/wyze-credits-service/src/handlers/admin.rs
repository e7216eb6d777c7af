//! Operator handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::handlers::parse_user_id;
use crate::state::AppState;

/// Purge response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeResponse {
    /// The purged user.
    pub user_id: String,
    /// Rows deleted across the ledger tables.
    pub removed: u64,
}

/// Delete every ledger row a user owns.
pub async fn purge_user(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(user_id): Path<String>,
) -> Result<Json<PurgeResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    let removed = state.service.purge_user(&user_id).await?;

    Ok(Json(PurgeResponse {
        user_id: user_id.to_string(),
        removed,
    }))
}

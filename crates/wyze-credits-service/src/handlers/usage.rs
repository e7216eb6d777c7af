//! Usage tracking handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wyze_credits_core::{Feature, UsageRecord};

use crate::auth::{AuthUser, ServiceAuth};
use crate::error::ApiError;
use crate::handlers::parse_user_id;
use crate::ledger::{CreditCheck, TrackUsage};
use crate::outcome::TrackUsageResult;
use crate::state::AppState;

/// Usage reported by the user's own client.
#[derive(Debug, Deserialize)]
pub struct TrackUsageRequest {
    /// The feature used.
    pub feature: Feature,
    /// Credits to debit (default: 1).
    #[serde(default = "default_credits")]
    pub credits: i64,
    /// Additional metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Usage reported by a backend on behalf of a user.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTrackUsageRequest {
    /// User being charged.
    pub user_id: String,
    /// The feature used.
    pub feature: Feature,
    /// Credits to debit (default: 1).
    #[serde(default = "default_credits")]
    pub credits: i64,
    /// Additional metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn default_credits() -> i64 {
    1
}

/// Track usage for the authenticated user.
pub async fn track_usage(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<TrackUsageRequest>,
) -> (StatusCode, Json<TrackUsageResult>) {
    let request = TrackUsage::new(auth.user_id, body.feature)
        .with_credits(body.credits)
        .with_metadata(body.metadata);

    let result = TrackUsageResult::from(state.service.track_usage(request).await);
    (result.status(), Json(result))
}

/// Track usage on behalf of a user.
pub async fn track_usage_for_user(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<ServiceTrackUsageRequest>,
) -> Result<(StatusCode, Json<TrackUsageResult>), ApiError> {
    let user_id = parse_user_id(&body.user_id)?;

    tracing::debug!(
        service = %auth.service_name,
        user_id = %user_id,
        feature = %body.feature,
        credits = body.credits,
        "Processing usage event"
    );

    let request = TrackUsage::new(user_id, body.feature)
        .with_credits(body.credits)
        .with_metadata(tag_service(body.metadata, &auth.service_name));

    let result = TrackUsageResult::from(state.service.track_usage(request).await);
    Ok((result.status(), Json(result)))
}

/// Record the reporting service in object metadata.
fn tag_service(metadata: serde_json::Value, service_name: &str) -> serde_json::Value {
    match metadata {
        serde_json::Value::Null => serde_json::json!({ "service": service_name }),
        serde_json::Value::Object(mut map) => {
            map.entry("service")
                .or_insert_with(|| serde_json::Value::String(service_name.to_string()));
            serde_json::Value::Object(map)
        }
        other => other,
    }
}

/// Credit check request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckCreditsRequest {
    /// User to check.
    pub user_id: String,
    /// Credits the caller is about to spend.
    pub required: i64,
}

/// Check whether a user can afford a debit.
pub async fn check_credits(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<CheckCreditsRequest>,
) -> Result<Json<CreditCheck>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;
    Ok(Json(state.service.check_credits(&user_id, body.required).await?))
}

/// Recent usage query parameters.
#[derive(Debug, Deserialize)]
pub struct RecentUsageQuery {
    /// RFC 3339 lower bound (default: start of the current month).
    pub since: Option<DateTime<Utc>>,
}

/// Recent usage response.
#[derive(Debug, Serialize)]
pub struct RecentUsageResponse {
    /// Usage records, oldest first.
    pub usage: Vec<UsageRecord>,
}

/// List the caller's usage records.
pub async fn list_usage(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<RecentUsageQuery>,
) -> Result<Json<RecentUsageResponse>, ApiError> {
    let since = query
        .since
        .or_else(|| wyze_credits_core::UsageMonth::current().start())
        .ok_or_else(|| ApiError::Internal("current month has no start".into()))?;

    let usage = state.service.usage_since(&auth.user_id, since).await?;
    Ok(Json(RecentUsageResponse { usage }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_is_added_without_overwriting() {
        assert_eq!(
            tag_service(serde_json::Value::Null, "assessments"),
            serde_json::json!({ "service": "assessments" })
        );
        assert_eq!(
            tag_service(serde_json::json!({ "sessionId": "s1" }), "chat"),
            serde_json::json!({ "sessionId": "s1", "service": "chat" })
        );
        assert_eq!(
            tag_service(serde_json::json!({ "service": "reports" }), "chat"),
            serde_json::json!({ "service": "reports" })
        );
    }
}

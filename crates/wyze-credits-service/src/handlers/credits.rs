//! Credit balance, history and grant handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use wyze_credits_core::{CreditBalance, CreditGrant, CreditTransaction, TransactionType};

use crate::auth::{AdminAuth, AuthUser};
use crate::error::ApiError;
use crate::handlers::parse_user_id;
use crate::ledger::{AddCredits, UsageOverview};
use crate::outcome::AddCreditsResult;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    /// Credits that can still be spent.
    pub available_credits: i64,
    /// The stored balance row, absent for users who never received credits.
    pub balance: Option<CreditBalance>,
}

/// Get the caller's credit balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.service.get_balance(&auth.user_id).await?;

    Ok(Json(BalanceResponse {
        available_credits: balance.as_ref().map_or(0, CreditBalance::available),
        balance,
    }))
}

/// Get the caller's usage for the current month.
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<UsageOverview>, ApiError> {
    Ok(Json(state.service.get_usage_summary(&auth.user_id).await?))
}

/// History query parameters.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum number of rows (default from configuration, at most 100).
    pub limit: Option<usize>,
    /// Rows to skip (default: 0).
    #[serde(default)]
    pub offset: usize,
}

/// History response.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Ledger rows, newest first.
    pub transactions: Vec<CreditTransaction>,
}

/// List the caller's ledger.
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let transactions = state
        .service
        .get_credit_history(&auth.user_id, query.limit, query.offset)
        .await?;

    Ok(Json(HistoryResponse { transactions }))
}

/// Add credits request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCreditsRequest {
    /// User receiving the credits.
    pub user_id: String,
    /// Credits to add.
    pub amount: i64,
    /// One of `purchase`, `bonus`, `monthly_allocation`, `refund`.
    #[serde(rename = "type")]
    pub grant_type: String,
    /// Ledger description.
    pub description: Option<String>,
    /// Additional metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Admin endpoint to apply a credit grant.
pub async fn add_credits(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<AddCreditsRequest>,
) -> Result<(StatusCode, Json<AddCreditsResult>), ApiError> {
    let user_id = parse_user_id(&body.user_id)?;
    let grant = parse_grant(&body.grant_type)?;

    let mut request = AddCredits::new(user_id, body.amount, grant).with_metadata(body.metadata);
    if let Some(description) = body.description {
        request = request.with_description(description);
    }

    let result = AddCreditsResult::from(state.service.add_credits(request).await);
    Ok((result.status(), Json(result)))
}

fn parse_grant(raw: &str) -> Result<CreditGrant, ApiError> {
    let kind: TransactionType = raw
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Unknown credit type: {raw}")))?;

    CreditGrant::try_from(kind)
        .map_err(|_| ApiError::BadRequest(format!("Credits cannot be added as {kind}")))
}

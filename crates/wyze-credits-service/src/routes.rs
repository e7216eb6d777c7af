//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, credits, health, usage};
use crate::state::AppState;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Credits (user JWT auth)
/// - `GET /v1/credits/balance` - Available credits and balance row
/// - `GET /v1/credits/summary` - Current month usage
/// - `GET /v1/credits/history` - Ledger, newest first
///
/// ## Usage
/// - `POST /v1/usage` - Track usage for the caller (user JWT)
/// - `GET /v1/usage` - Caller's usage records (user JWT)
/// - `POST /v1/usage/track` - Track usage for a user (service key)
/// - `POST /v1/usage/check` - Affordability check (service key)
///
/// ## Admin (admin key)
/// - `POST /v1/credits/add` - Apply a credit grant
/// - `DELETE /v1/admin/users/:user_id/credits` - Purge a user's ledger
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let state = Arc::new(state);

    Router::new()
        // Health (public)
        .route("/health", get(health::health))
        // Credits
        .route("/v1/credits/balance", get(credits::get_balance))
        .route("/v1/credits/summary", get(credits::get_summary))
        .route("/v1/credits/history", get(credits::get_history))
        .route("/v1/credits/add", post(credits::add_credits))
        // Usage
        .route(
            "/v1/usage",
            post(usage::track_usage).get(usage::list_usage),
        )
        .route("/v1/usage/track", post(usage::track_usage_for_user))
        .route("/v1/usage/check", post(usage::check_credits))
        // Admin
        .route(
            "/v1/admin/users/:user_id/credits",
            delete(admin::purge_user),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(origins)
    }
}

//! Application state.

use std::sync::Arc;

use wyze_credits_store::Store;

use crate::auth::JwtVerifier;
use crate::config::ServiceConfig;
use crate::ledger::UsageTrackingService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The credit ledger.
    pub service: UsageTrackingService,

    /// Service configuration.
    pub config: ServiceConfig,

    /// User token verifier, absent when no JWT secret is configured.
    pub jwt: Option<JwtVerifier>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let service = UsageTrackingService::new(store)
            .with_default_history_limit(config.history_default_limit);

        let jwt = config.auth_jwt_secret.as_deref().map(|secret| {
            JwtVerifier::new(secret, &config.auth_issuer, &config.auth_audience)
        });

        if jwt.is_none() {
            tracing::warn!("AUTH_JWT_SECRET not configured - user routes will reject all requests");
        }
        if config.service_api_key.is_none() {
            tracing::warn!("SERVICE_API_KEY not configured - service routes disabled");
        }
        if config.admin_api_key.is_none() {
            tracing::warn!("ADMIN_API_KEY not configured - admin routes disabled");
        }

        Self {
            service,
            config,
            jwt,
        }
    }

    /// Name of the storage backend.
    #[must_use]
    pub fn backend(&self) -> &'static str {
        self.service.store().backend()
    }
}

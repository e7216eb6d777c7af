//! Common test utilities for wyze-credits integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{EncodingKey, Header};

use wyze_credits_core::{CreditGrant, UserId};
use wyze_credits_service::auth::JwtClaims;
use wyze_credits_service::{create_router, AddCredits, AppState, ServiceConfig, UsageTrackingService};
use wyze_credits_store::MemoryStore;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const ISSUER: &str = "senseiiwyze";
pub const AUDIENCE: &str = "wyze-credits";
pub const SERVICE_API_KEY: &str = "test-service-key";
pub const ADMIN_API_KEY: &str = "test-admin-key";

/// Test harness containing everything needed for HTTP integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The store behind the server.
    pub store: Arc<MemoryStore>,
    /// The ledger behind the server, for seeding balances.
    pub service: UsageTrackingService,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
}

impl TestHarness {
    /// Create a new test harness with an empty store.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Create a harness with a custom configuration.
    pub fn with_config(config: ServiceConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), config);
        let service = state.service.clone();
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            service,
            test_user_id: UserId::generate(),
        }
    }

    /// Give the test user a balance of `total` purchased and `bonus` bonus credits.
    pub async fn fund(&self, total: i64, bonus: i64) {
        fund(&self.service, &self.test_user_id, total, bonus).await;
    }

    /// Bearer token for the test user.
    pub fn user_auth(&self) -> HeaderValue {
        bearer(&mint_token(self.test_user_id.as_str(), JWT_SECRET, 600))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration with every auth scheme enabled.
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        auth_jwt_secret: Some(JWT_SECRET.into()),
        service_api_key: Some(SERVICE_API_KEY.into()),
        admin_api_key: Some(ADMIN_API_KEY.into()),
        ..ServiceConfig::default()
    }
}

/// Seed a balance through the public ledger API.
pub async fn fund(service: &UsageTrackingService, user_id: &UserId, total: i64, bonus: i64) {
    if total > 0 {
        service
            .add_credits(AddCredits::new(user_id.clone(), total, CreditGrant::Purchase))
            .await
            .expect("purchase");
    }
    if bonus > 0 {
        service
            .add_credits(AddCredits::new(user_id.clone(), bonus, CreditGrant::Bonus))
            .await
            .expect("bonus");
    }
}

/// Sign a user token the way the identity provider does.
pub fn mint_token(sub: &str, secret: &str, ttl_seconds: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = JwtClaims {
        sub: sub.to_string(),
        aud: AUDIENCE.into(),
        iss: ISSUER.into(),
        exp: now + ttl_seconds,
        iat: now,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to sign token")
}

pub fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).expect("valid header value")
}

pub fn authorization() -> HeaderName {
    HeaderName::from_static("authorization")
}

pub fn api_key() -> HeaderName {
    HeaderName::from_static("x-api-key")
}

pub fn service_name() -> HeaderName {
    HeaderName::from_static("x-service-name")
}

pub fn admin_key() -> HeaderName {
    HeaderName::from_static("x-admin-key")
}

pub fn value(raw: &'static str) -> HeaderValue {
    HeaderValue::from_static(raw)
}

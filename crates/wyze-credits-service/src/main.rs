//! wyze-credits service - HTTP API for the SenseiiWyze credit ledger.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wyze_credits_service::{create_router, AppState, ServiceConfig};
use wyze_credits_store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wyze_credits=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting wyze-credits service");

    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        database_configured = config.database_url.is_some(),
        jwt_configured = config.auth_jwt_secret.is_some(),
        history_default_limit = config.history_default_limit,
        "Service configuration loaded"
    );

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            tracing::info!(
                max_connections = config.database_max_connections,
                "Connecting to PostgreSQL"
            );
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set - using in-memory store, data is not persisted");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(store, config.clone());

    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

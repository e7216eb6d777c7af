//! Service configuration.

use serde::Deserialize;
use std::path::Path;

use crate::ledger::DEFAULT_HISTORY_LIMIT;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// PostgreSQL connection URL. Without one the service runs on the
    /// in-memory store.
    pub database_url: Option<String>,

    /// Connection pool size (default: 10).
    pub database_max_connections: u32,

    /// HS256 secret for user JWTs. User routes reject every request when unset.
    pub auth_jwt_secret: Option<String>,

    /// Expected JWT issuer (default: "senseiiwyze").
    pub auth_issuer: String,

    /// Expected JWT audience (default: "wyze-credits").
    pub auth_audience: String,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// Admin API key for credit grants and purges.
    pub admin_api_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// History rows returned when a request gives no limit.
    pub history_default_limit: usize,
}

/// Database secrets file structure.
#[derive(Debug, Deserialize)]
struct DatabaseSecrets {
    url: String,
    #[serde(default)]
    max_connections: Option<u32>,
}

/// Auth secrets file structure.
#[derive(Debug, Default, Deserialize)]
struct AuthSecrets {
    #[serde(default)]
    jwt_secret: Option<String>,
    #[serde(default)]
    service_api_key: Option<String>,
    #[serde(default)]
    admin_api_key: Option<String>,
}

const DATABASE_SECRET_PATHS: [&str; 3] = [
    ".secrets/database.json",
    "wyze-credits/.secrets/database.json",
    "../.secrets/database.json",
];

const AUTH_SECRET_PATHS: [&str; 3] = [
    ".secrets/auth.json",
    "wyze-credits/.secrets/auth.json",
    "../.secrets/auth.json",
];

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        // Secrets files win over the environment
        let database = find_secrets::<DatabaseSecrets>(&DATABASE_SECRET_PATHS);
        let auth = find_secrets::<AuthSecrets>(&AUTH_SECRET_PATHS).unwrap_or_default();

        let database_max_connections = database
            .as_ref()
            .and_then(|secrets| secrets.max_connections)
            .or_else(|| env_parse("DATABASE_MAX_CONNECTIONS"))
            .unwrap_or(defaults.database_max_connections);

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: database
                .map(|secrets| secrets.url)
                .or_else(|| std::env::var("DATABASE_URL").ok()),
            database_max_connections,
            auth_jwt_secret: auth
                .jwt_secret
                .or_else(|| std::env::var("AUTH_JWT_SECRET").ok()),
            auth_issuer: std::env::var("AUTH_ISSUER").unwrap_or(defaults.auth_issuer),
            auth_audience: std::env::var("AUTH_AUDIENCE").unwrap_or(defaults.auth_audience),
            service_api_key: auth
                .service_api_key
                .or_else(|| std::env::var("SERVICE_API_KEY").ok()),
            admin_api_key: auth
                .admin_api_key
                .or_else(|| std::env::var("ADMIN_API_KEY").ok()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|origins| parse_origins(&origins))
                .unwrap_or(defaults.cors_origins),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
            history_default_limit: env_parse("HISTORY_DEFAULT_LIMIT")
                .unwrap_or(defaults.history_default_limit),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: None,
            database_max_connections: 10,
            auth_jwt_secret: None,
            auth_issuer: "senseiiwyze".into(),
            auth_audience: "wyze-credits".into(),
            service_api_key: None,
            admin_api_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024, // 1MB
            request_timeout_seconds: 30,
            history_default_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn parse_origins(origins: &str) -> Vec<String> {
    origins
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Load the first readable secrets file among `paths`.
fn find_secrets<T: serde::de::DeserializeOwned>(paths: &[impl AsRef<Path>]) -> Option<T> {
    for path in paths {
        let path = path.as_ref();
        match load_secrets_file::<T>(path) {
            Ok(secrets) => {
                tracing::info!(path = %path.display(), "Loaded secrets from file");
                return Some(secrets);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable secrets file");
            }
        }
    }
    tracing::debug!("No secrets file found, using environment variables");
    None
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, std::io::Error> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

//! Application state and configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;

use crate::registry::{CkanRegistry, MetadataSource};
use crate::store::{ClickHouseStore, EventStore};

/// Default registry request timeout in seconds.
const DEFAULT_REGISTRY_TIMEOUT_SECS: u64 = 10;

/// Application configuration loaded from environment.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:3000").
    pub bind_addr: String,

    /// Shared secret expected as `Authorization: Bearer <secret>`.
    pub secret_key: String,

    /// ClickHouse connection URL.
    pub clickhouse_url: String,

    /// ClickHouse database name.
    pub clickhouse_database: String,

    /// ClickHouse credentials (optional).
    pub clickhouse_user: Option<String>,
    pub clickhouse_password: Option<String>,

    /// The single origin allowed for cross-origin requests (optional).
    pub cors_origin: Option<String>,

    /// Base URL of the CKAN-style metadata registry.
    pub registry_url: String,

    /// Per-lookup timeout for registry requests.
    pub registry_timeout: Duration,

    /// Port for the Prometheus `/metrics` listener (optional).
    pub metrics_port: Option<u16>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("secret_key", &"<redacted>")
            .field("clickhouse_url", &self.clickhouse_url)
            .field("clickhouse_database", &self.clickhouse_database)
            .field("clickhouse_user", &self.clickhouse_user)
            .field(
                "clickhouse_password",
                &self.clickhouse_password.as_ref().map(|_| "<redacted>"),
            )
            .field("cors_origin", &self.cors_origin)
            .field("registry_url", &self.registry_url)
            .field("registry_timeout", &self.registry_timeout)
            .field("metrics_port", &self.metrics_port)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `DATAPULSE_SECRET_KEY`: Shared secret for the mutating endpoints
    ///
    /// Optional environment variables:
    /// - `DATAPULSE_BIND_ADDR`: Server bind address (default: "0.0.0.0:3000")
    /// - `CLICKHOUSE_URL`: ClickHouse URL (default: "http://localhost:8123")
    /// - `CLICKHOUSE_DATABASE`: Database name (default: "default")
    /// - `CLICKHOUSE_USER` / `CLICKHOUSE_PASSWORD`: Credentials
    /// - `DATAPULSE_CORS_ORIGIN`: Exactly one allowed origin
    /// - `DATAPULSE_REGISTRY_URL`: Registry base URL (default: "https://catalog.data.gov")
    /// - `DATAPULSE_REGISTRY_TIMEOUT_SECS`: Lookup timeout (default: 10)
    /// - `DATAPULSE_METRICS_PORT`: Serve Prometheus metrics on this port
    pub fn from_env() -> anyhow::Result<Self> {
        let secret_key = std::env::var("DATAPULSE_SECRET_KEY")
            .map_err(|_| anyhow::anyhow!("DATAPULSE_SECRET_KEY environment variable is required"))?
            .trim()
            .to_string();

        if secret_key.is_empty() {
            anyhow::bail!("DATAPULSE_SECRET_KEY must not be empty");
        }

        let bind_addr =
            std::env::var("DATAPULSE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let clickhouse_url =
            std::env::var("CLICKHOUSE_URL").unwrap_or_else(|_| "http://localhost:8123".to_string());

        let clickhouse_database =
            std::env::var("CLICKHOUSE_DATABASE").unwrap_or_else(|_| "default".to_string());

        let clickhouse_user = non_empty_var("CLICKHOUSE_USER");
        let clickhouse_password = non_empty_var("CLICKHOUSE_PASSWORD");

        let cors_origin = non_empty_var("DATAPULSE_CORS_ORIGIN");
        if let Some(origin) = &cors_origin {
            if origin.contains(',') {
                anyhow::bail!("DATAPULSE_CORS_ORIGIN accepts a single origin, got '{origin}'");
            }
            HeaderValue::from_str(origin)
                .map_err(|e| anyhow::anyhow!("invalid DATAPULSE_CORS_ORIGIN '{origin}': {e}"))?;
        }

        let registry_url = std::env::var("DATAPULSE_REGISTRY_URL")
            .unwrap_or_else(|_| "https://catalog.data.gov".to_string())
            .trim_end_matches('/')
            .to_string();

        let registry_timeout = match non_empty_var("DATAPULSE_REGISTRY_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.parse().map_err(|e| {
                anyhow::anyhow!("invalid DATAPULSE_REGISTRY_TIMEOUT_SECS '{raw}': {e}")
            })?),
            None => Duration::from_secs(DEFAULT_REGISTRY_TIMEOUT_SECS),
        };

        let metrics_port = non_empty_var("DATAPULSE_METRICS_PORT")
            .map(|raw| {
                raw.parse::<u16>()
                    .map_err(|e| anyhow::anyhow!("invalid DATAPULSE_METRICS_PORT '{raw}': {e}"))
            })
            .transpose()?;

        tracing::info!(
            bind_addr = %bind_addr,
            clickhouse_url = %clickhouse_url,
            clickhouse_database = %clickhouse_database,
            cors_origin = ?cors_origin,
            registry_url = %registry_url,
            registry_timeout_secs = registry_timeout.as_secs(),
            metrics_port = ?metrics_port,
            "configuration loaded"
        );

        Ok(Self {
            bind_addr,
            secret_key,
            clickhouse_url,
            clickhouse_database,
            clickhouse_user,
            clickhouse_password,
            cors_origin,
            registry_url,
            registry_timeout,
            metrics_port,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Event Store for logging and aggregation.
    pub store: Arc<dyn EventStore>,

    /// Metadata registry used for enrichment.
    pub registry: Arc<dyn MetadataSource>,

    /// Application configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Create application state from explicit collaborators.
    pub fn new(
        config: Config,
        store: Arc<dyn EventStore>,
        registry: Arc<dyn MetadataSource>,
    ) -> Self {
        Self {
            store,
            registry,
            config: Arc::new(config),
        }
    }

    /// Create application state backed by ClickHouse and the CKAN registry.
    ///
    /// Fails fast if the events table cannot be created or reached.
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let store = ClickHouseStore::new(&config);
        store.ensure_schema().await?;
        let registry = CkanRegistry::new(&config.registry_url, config.registry_timeout)?;

        tracing::info!("application state initialized");

        Ok(Self::new(config, Arc::new(store), Arc::new(registry)))
    }
}

//! PostgreSQL pool for the account and transfer tables.

use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{debug, instrument, warn};

use cofre_core::error::{StorageError, StorageResult};

/// Name reported in `pg_stat_activity`.
const APPLICATION_NAME: &str = "cofre";

/// Pool settings. Connection acquisition gives up after five seconds.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 20,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
        }
    }

    /// Cap the pool size. Never below one connection, and the idle floor
    /// follows the cap down.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self.min_connections = self.min_connections.min(self.max_connections);
        self
    }

    fn connect_options(&self) -> StorageResult<PgConnectOptions> {
        PgConnectOptions::from_str(&self.url)
            .map(|options| options.application_name(APPLICATION_NAME))
            .map_err(|e| StorageError::ConnectionError(format!("invalid database url: {e}")))
    }
}

/// Shared connection pool. Clones share the same connections.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[instrument(skip_all)]
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        let options = config.connect_options()?;
        debug!(
            max_conn = config.max_connections,
            min_conn = config.min_connections,
            "Opening account pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create or upgrade the `accounts` and `transfers` tables.
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::MigrationError(e.to_string()))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Round-trip a trivial statement through the pool.
pub(crate) async fn ping(pool: &PgPool) -> StorageResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|e| {
            warn!(error = %e, "Database ping failed");
            StorageError::ConnectionError(e.to_string())
        })
}

//! Cofre - banking API with REST and GraphQL front-ends.
//!
//! # Usage
//!
//! ```bash
//! # In-memory accounts seeded from a file
//! JWT_SECRET=change-me SEED_FILE=contas.json cofre
//!
//! # PostgreSQL storage
//! JWT_SECRET=change-me STORAGE=postgres DATABASE_URL=postgres://localhost/cofre cofre
//!
//! # Let the users of a file log in via POST /login
//! JWT_SECRET=change-me USERS_FILE=usuarios.json cofre
//!
//! # Mint a bearer token and exit
//! JWT_SECRET=change-me cofre --issue-token ana --token-user-id 1
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::signal;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::{EnvFilter, fmt};

use cofre_core::auth::{AuthConfig, Authenticator, Identity, UserDirectory, UserRecord};
use cofre_core::metrics::init_metrics;
use cofre_core::models::{MAX_AMOUNT_SCALE, NewAccount};
use cofre_core::ports::{AccountStore, TransferLedger};
use cofre_core::services::{
    AccountQueryService, IdempotencyPolicy, OverdraftPolicy, TransferConfig, TransferEngine,
};
use cofre_storage::{
    Database, DatabaseConfig, InMemoryAccountStore, InMemoryTransferLedger, PgAccountStore,
    PgTransferLedger,
};

/// Cofre CLI - banking API server.
#[derive(Parser, Debug)]
#[command(name = "cofre")]
#[command(about = "Cofre - account queries and transfers over REST and GraphQL")]
#[command(version)]
struct Cli {
    /// REST server port.
    #[arg(long, env = "REST_PORT", default_value = "3000")]
    rest_port: u16,

    /// GraphQL server port.
    #[arg(long, env = "GRAPHQL_PORT", default_value = "4000")]
    graphql_port: u16,

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// Storage backend: memory (process lifetime) or postgres.
    #[arg(long, env = "STORAGE", default_value = "memory", value_parser = parse_backend)]
    storage: Backend,

    /// PostgreSQL database URL (postgres backend only).
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://localhost/cofre")]
    database_url: String,

    /// Connection pool size (postgres backend only).
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value = "20")]
    db_max_connections: u32,

    /// Shared secret used to sign and verify bearer tokens.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true, value_parser = parse_secret)]
    jwt_secret: String,

    /// Lifetime of issued tokens, in seconds.
    #[arg(long, env = "TOKEN_TTL_SECS", default_value = "3600")]
    token_ttl_secs: u64,

    /// Attempts for the debit and credit steps of a transfer.
    #[arg(long, env = "TRANSFER_MAX_ATTEMPTS", default_value = "5")]
    transfer_max_attempts: u32,

    /// Attempts to restore the source after a failed credit.
    #[arg(long, env = "COMPENSATION_ATTEMPTS", default_value = "10")]
    compensation_attempts: u32,

    /// Deadline for each storage call, in milliseconds.
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value = "2000")]
    store_timeout_ms: u64,

    /// Base delay between transfer retries, in milliseconds.
    #[arg(long, env = "RETRY_BACKOFF_MS", default_value = "10")]
    retry_backoff_ms: u64,

    /// Overdraft policy: disabled or per-account.
    #[arg(long, env = "OVERDRAFT_POLICY", default_value = "disabled")]
    overdraft_policy: OverdraftPolicy,

    /// Request id policy when a client omits one: required or generate.
    #[arg(long, env = "IDEMPOTENCY_KEYS", default_value = "required")]
    idempotency_keys: IdempotencyPolicy,

    /// Allow GraphQL queries without a bearer token (mutations always need one).
    #[arg(long, env = "GRAPHQL_PUBLIC_QUERIES")]
    graphql_public_queries: bool,

    /// JSON file of accounts to provision when the store is empty.
    #[arg(long, env = "SEED_FILE")]
    seed_file: Option<PathBuf>,

    /// JSON file of users allowed to log in via `POST /login`.
    #[arg(long, env = "USERS_FILE")]
    users_file: Option<PathBuf>,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Run database migrations and exit.
    #[arg(long)]
    migrate_only: bool,

    /// Print a bearer token for the given username and exit.
    #[arg(long, value_name = "USERNAME")]
    issue_token: Option<String>,

    /// User id embedded in the token minted by --issue-token.
    #[arg(long, default_value = "1", requires = "issue_token")]
    token_user_id: i64,
}

/// Storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Memory,
    Postgres,
}

/// Parse storage backend from string.
fn parse_backend(s: &str) -> Result<Backend, String> {
    match s.to_lowercase().as_str() {
        "memory" => Ok(Backend::Memory),
        "postgres" => Ok(Backend::Postgres),
        _ => Err(format!(
            "Invalid storage backend '{}'. Use 'memory' or 'postgres'.",
            s
        )),
    }
}

/// Reject an empty signing secret.
fn parse_secret(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        return Err("JWT secret must not be empty".to_string());
    }
    Ok(s.to_string())
}

/// Account entry of the seed file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedAccount {
    titular: String,
    saldo: Decimal,
    #[serde(default = "default_active")]
    ativa: bool,
    #[serde(default)]
    permite_saldo_negativo: bool,
}

fn default_active() -> bool {
    true
}

impl From<SeedAccount> for NewAccount {
    fn from(seed: SeedAccount) -> Self {
        NewAccount {
            holder_name: seed.titular,
            balance: seed.saldo,
            active: seed.ativa,
            allow_overdraft: seed.permite_saldo_negativo,
        }
    }
}

/// Storage adapters selected at startup.
struct Storage {
    accounts: Arc<dyn AccountStore>,
    ledger: Arc<dyn TransferLedger>,
    database: Option<Database>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    let auth_config = AuthConfig {
        secret: cli.jwt_secret.clone(),
        token_ttl: Duration::from_secs(cli.token_ttl_secs),
    };
    let authenticator = Arc::new(Authenticator::new(&auth_config));

    if let Some(username) = &cli.issue_token {
        let token = authenticator
            .issue(&Identity {
                id: cli.token_user_id,
                username: username.clone(),
            })
            .context("Failed to issue token")?;
        println!("{}", token);
        return Ok(());
    }

    // Prometheus metrics exporter (optional - failures don't crash the app)
    let metrics_enabled = match format!("0.0.0.0:{}", cli.metrics_port).parse::<std::net::SocketAddr>() {
        Ok(metrics_addr) => {
            match PrometheusBuilder::new()
                .with_http_listener(metrics_addr)
                .install()
            {
                Ok(()) => {
                    init_metrics();
                    true
                }
                Err(e) => {
                    warn!("⚠️  Failed to start metrics exporter: {}. Continuing without metrics.", e);
                    false
                }
            }
        }
        Err(e) => {
            warn!("⚠️  Invalid metrics address: {}. Continuing without metrics.", e);
            false
        }
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 🚀 STARTUP
    // ─────────────────────────────────────────────────────────────────────────
    info!("🚀 Starting Cofre");
    debug!(auth = ?auth_config, "Authentication");

    // ─────────────────────────────────────────────────────────────────────────
    // 🗄️ STORAGE
    // ─────────────────────────────────────────────────────────────────────────
    let storage = match cli.storage {
        Backend::Memory => {
            info!("🗄️  Using in-memory storage (data is lost on exit)");
            Storage {
                accounts: Arc::new(InMemoryAccountStore::new()),
                ledger: Arc::new(InMemoryTransferLedger::new()),
                database: None,
            }
        }
        Backend::Postgres => {
            debug!(database_url = %mask_password(&cli.database_url), "Database endpoint");
            info!("🗄️  Connecting to database...");
            let config =
                DatabaseConfig::new(&cli.database_url).with_max_connections(cli.db_max_connections);
            let db = Database::connect(&config)
                .await
                .context("Failed to connect to database")?;

            db.migrate().await.context("Failed to run migrations")?;
            info!("🗄️  Database ready (migrations applied)");

            Storage {
                accounts: Arc::new(PgAccountStore::new(&db)),
                ledger: Arc::new(PgTransferLedger::new(&db)),
                database: Some(db),
            }
        }
    };

    if cli.migrate_only {
        if storage.database.is_none() {
            warn!("⚠️  --migrate-only has no effect with in-memory storage");
        }
        info!("🛑 --migrate-only flag set, exiting");
        return Ok(());
    }

    if let Some(path) = &cli.seed_file {
        seed_accounts(storage.accounts.as_ref(), path).await?;
    }

    let users = match &cli.users_file {
        Some(path) => load_users(path).await?,
        None => {
            warn!("⚠️  No users file configured, POST /login rejects every user");
            UserDirectory::default()
        }
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 💸 SERVICES
    // ─────────────────────────────────────────────────────────────────────────
    let transfer_config = TransferConfig {
        max_attempts: cli.transfer_max_attempts,
        compensation_attempts: cli.compensation_attempts,
        store_timeout: Duration::from_millis(cli.store_timeout_ms),
        retry_backoff: Duration::from_millis(cli.retry_backoff_ms),
        overdraft: cli.overdraft_policy,
        idempotency: cli.idempotency_keys,
    };
    debug!(config = ?transfer_config, "Transfer engine");

    let accounts = AccountQueryService::new(storage.accounts.clone(), storage.ledger.clone());
    let transfers = TransferEngine::new(
        transfer_config,
        storage.accounts.clone(),
        storage.ledger.clone(),
    );

    // ─────────────────────────────────────────────────────────────────────────
    // ⚡ SERVERS START
    // ─────────────────────────────────────────────────────────────────────────
    let (shutdown_tx, _) = watch::channel(false);

    let rest_state = cofre_rest::AppState {
        accounts: accounts.clone(),
        transfers: transfers.clone(),
        auth: authenticator.clone(),
        users: Arc::new(users),
    };
    let rest_config = cofre_rest::ServerConfig {
        host: "0.0.0.0".to_string(),
        port: cli.rest_port,
    };
    let mut rest_shutdown_rx = shutdown_tx.subscribe();
    let rest_shutdown_tx = shutdown_tx.clone();
    let rest_handle = tokio::spawn(
        async move {
            let shutdown_signal = async move {
                while !*rest_shutdown_rx.borrow() {
                    if rest_shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            };

            if let Err(e) =
                cofre_rest::serve_with_shutdown(rest_state, rest_config, shutdown_signal).await
            {
                error!(error = %e, "❌ Server error");
                // One surface down takes the process down
                let _ = rest_shutdown_tx.send(true);
            }
            debug!("Server stopped");
        }
        .instrument(info_span!("rest")),
    );

    let graphql_accounts = accounts.clone();
    let schema = cofre_graphql::build_schema(accounts, transfers, cli.graphql_public_queries);
    let graphql_config = cofre_graphql::ServerConfig {
        host: "0.0.0.0".to_string(),
        port: cli.graphql_port,
        enable_playground: true,
    };
    let mut graphql_shutdown_rx = shutdown_tx.subscribe();
    let graphql_shutdown_tx = shutdown_tx.clone();
    let graphql_auth = authenticator.clone();
    let graphql_handle = tokio::spawn(
        async move {
            let shutdown_signal = async move {
                while !*graphql_shutdown_rx.borrow() {
                    if graphql_shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            };

            if let Err(e) = cofre_graphql::serve_with_shutdown(
                schema,
                graphql_accounts,
                graphql_auth,
                graphql_config,
                shutdown_signal,
            )
            .await
            {
                error!(error = %e, "❌ Server error");
                let _ = graphql_shutdown_tx.send(true);
            }
            debug!("Server stopped");
        }
        .instrument(info_span!("graphql")),
    );

    // ─────────────────────────────────────────────────────────────────────────
    // ✅ READY
    // ─────────────────────────────────────────────────────────────────────────
    info!("✅ Cofre ready");
    info!("   🌐 REST:     http://localhost:{}", cli.rest_port);
    info!("   ⚡ GraphQL:  http://localhost:{}/graphql", cli.graphql_port);
    if metrics_enabled {
        info!(
            "   📊 Metrics:  http://localhost:{}/metrics",
            cli.metrics_port
        );
    } else {
        info!("   📊 Metrics:  disabled");
    }
    info!("   Press Ctrl+C to stop");

    let mut failure_rx = shutdown_tx.subscribe();
    tokio::select! {
        _ = shutdown_signal() => {}
        _ = failure_rx.wait_for(|stop| *stop) => warn!("⚠️  A server stopped unexpectedly"),
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 🛑 SHUTDOWN
    // ─────────────────────────────────────────────────────────────────────────
    info!("🛑 Shutting down...");
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(Duration::from_secs(10), rest_handle).await {
        Ok(_) => debug!("REST stopped"),
        Err(_) => warn!("⚠️  REST shutdown timed out"),
    }

    match tokio::time::timeout(Duration::from_secs(10), graphql_handle).await {
        Ok(_) => debug!("GraphQL stopped"),
        Err(_) => warn!("⚠️  GraphQL shutdown timed out"),
    }

    if let Some(db) = storage.database {
        db.close().await;
    }

    info!("🛑 Shutdown complete");
    Ok(())
}

/// Provision the accounts of a seed file, unless the store already holds accounts.
async fn seed_accounts(store: &dyn AccountStore, path: &Path) -> Result<()> {
    let existing = store.list().await.context("Failed to list accounts")?;
    if !existing.is_empty() {
        info!(
            accounts = existing.len(),
            "🌱 Store already provisioned, skipping seed file"
        );
        return Ok(());
    }

    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    let seeds = parse_seed(&raw)
        .with_context(|| format!("Invalid seed file {}", path.display()))?;

    for seed in seeds {
        let account = store
            .provision(seed.into())
            .await
            .context("Failed to provision account")?;
        debug!(id = %account.id, holder = %account.holder_name, "Account provisioned");
    }

    let total = store.list().await.context("Failed to list accounts")?.len();
    info!(accounts = total, "🌱 Accounts provisioned");
    Ok(())
}

/// Parse and check seed file contents.
fn parse_seed(raw: &str) -> Result<Vec<SeedAccount>> {
    let seeds: Vec<SeedAccount> = serde_json::from_str(raw)?;
    for seed in &seeds {
        if seed.titular.trim().is_empty() {
            bail!("account holder name must not be empty");
        }
        if seed.saldo.is_sign_negative() && !seed.permite_saldo_negativo {
            bail!(
                "account '{}' starts with a negative balance but does not allow overdraft",
                seed.titular
            );
        }
        if seed.saldo.normalize().scale() > MAX_AMOUNT_SCALE {
            bail!(
                "account '{}' balance {} has more than {} decimal places",
                seed.titular,
                seed.saldo,
                MAX_AMOUNT_SCALE
            );
        }
    }
    Ok(seeds)
}

/// Load the users accepted by `POST /login`.
async fn load_users(path: &Path) -> Result<UserDirectory> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read users file {}", path.display()))?;
    let users =
        parse_users(&raw).with_context(|| format!("Invalid users file {}", path.display()))?;
    info!(users = users.len(), "🔑 Login users loaded");
    Ok(users)
}

/// Parse and check users file contents.
fn parse_users(raw: &str) -> Result<UserDirectory> {
    let records: Vec<UserRecord> = serde_json::from_str(raw)?;
    for (i, record) in records.iter().enumerate() {
        if record.username.trim().is_empty() {
            bail!("user #{} has an empty username", i + 1);
        }
        if record.password.is_empty() {
            bail!("user '{}' has an empty password", record.username);
        }
        if records[..i].iter().any(|other| other.username == record.username) {
            bail!("user '{}' is listed twice", record.username);
        }
    }
    Ok(UserDirectory::new(records))
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Mask password in database URL for logging.
fn mask_password(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

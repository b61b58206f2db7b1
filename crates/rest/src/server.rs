//! REST HTTP server.

use std::future::Future;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::handlers;
use crate::middleware::require_auth;
use crate::state::AppState;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Build the REST router.
///
/// Every route except `/health` and `/login` requires a bearer token.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/contas", get(handlers::list_accounts))
        .route("/contas/{id}", get(handlers::get_account))
        .route("/contas/{id}/transferencias", get(handlers::account_history))
        .route("/transferencias", post(handlers::create_transfer))
        .route("/transferencias/{request_id}", get(handlers::get_transfer))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/login", post(handlers::login))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the REST server with graceful shutdown support.
pub async fn serve_with_shutdown<F>(
    state: AppState,
    config: ServerConfig,
    shutdown_signal: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    debug!(addr = %addr, "REST server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
}

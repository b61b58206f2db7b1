//! GraphQL HTTP server.

use std::future::Future;
use std::sync::Arc;

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{Html, IntoResponse},
    routing::get,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use cofre_core::auth::Authenticator;
use cofre_core::error::AuthError;
use cofre_core::services::AccountQueryService;

use crate::types::{Caller, CofreSchema};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_playground: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            enable_playground: true,
        }
    }
}

#[derive(Clone)]
struct GraphqlState {
    schema: CofreSchema,
    accounts: AccountQueryService,
    auth: Arc<Authenticator>,
}

/// Build the GraphQL router. `accounts` backs `/health`.
pub fn router(
    schema: CofreSchema,
    accounts: AccountQueryService,
    auth: Arc<Authenticator>,
    enable_playground: bool,
) -> Router {
    let mut app = Router::new()
        .route("/graphql", get(graphql_playground).post(graphql_handler))
        .route("/health", get(health_check));

    if enable_playground {
        app = app.route("/", get(graphql_playground));
    }

    app.layer(TraceLayer::new_for_http())
        .with_state(GraphqlState {
            schema,
            accounts,
            auth,
        })
}

/// Start the GraphQL server with graceful shutdown support.
pub async fn serve_with_shutdown<F>(
    schema: CofreSchema,
    accounts: AccountQueryService,
    auth: Arc<Authenticator>,
    config: ServerConfig,
    shutdown_signal: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(schema, accounts, auth, config.enable_playground);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    debug!(addr = %addr, "GraphQL server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
}

/// GraphQL query handler.
///
/// The bearer credential is verified here, once per HTTP request; the
/// outcome travels with the operation as [`Caller`].
async fn graphql_handler(
    State(state): State<GraphqlState>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let credential = headers
        .get(AUTHORIZATION)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

    // Anonymous requests are only a failure if a resolver asks for an identity.
    let caller = match credential {
        Some(credential) => Caller(state.auth.authenticate(Some(&credential))),
        None => Caller(Err(AuthError::MissingCredential)),
    };

    state
        .schema
        .execute(req.into_inner().data(caller))
        .await
        .into()
}

/// GraphQL Playground UI.
async fn graphql_playground() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

/// Health check endpoint. 503 while the account store is unreachable.
async fn health_check(State(state): State<GraphqlState>) -> (StatusCode, &'static str) {
    match state.accounts.check_health().await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(err) => {
            warn!(error = %err, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE")
        }
    }
}

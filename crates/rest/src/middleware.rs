//! Authentication middleware.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::error::ApiErrorResponse;
use crate::state::AppState;

/// Reject requests without a valid bearer token.
///
/// On success the caller [`Identity`](cofre_core::auth::Identity) is
/// stored in the request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiErrorResponse> {
    let credential = request
        .headers()
        .get(AUTHORIZATION)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

    let identity = state.auth.authenticate(credential.as_deref())?;
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

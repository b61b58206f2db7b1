//! Route handlers.

use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
};
use tracing::{debug, info, warn};

use cofre_core::auth::Identity;
use cofre_core::models::{AccountId, RequestId, TransferRequest};

use crate::dto::{
    AccountResponse, HistoryParams, LoginBody, LoginResponse, TransferBody, TransferResponse,
};
use crate::error::ApiErrorResponse;
use crate::state::AppState;

/// Header carrying the request id when the body does not.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

type ApiResult<T> = Result<T, ApiErrorResponse>;

/// Ids that do not parse cannot exist.
fn parse_account_id(raw: &str) -> ApiResult<AccountId> {
    raw.parse::<i64>()
        .map(AccountId)
        .map_err(|_| ApiErrorResponse::account_not_found())
}

/// `POST /login` - exchange a username and password for a bearer token.
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(body) = body.map_err(|e| {
        debug!(error = %e.body_text(), "Rejected login body");
        ApiErrorResponse::bad_request("INVALID_REQUEST", "Corpo do login inválido")
    })?;

    let identity = state.users.login(&body.username, &body.password)?;
    let token = state.auth.issue(&identity)?;
    info!(user = %identity.username, "🔑 Token issued");

    Ok(Json(LoginResponse { token }))
}

/// `GET /contas`
pub async fn list_accounts(State(state): State<AppState>) -> ApiResult<Json<Vec<AccountResponse>>> {
    let accounts = state.accounts.list_accounts().await?;
    Ok(Json(accounts.into_iter().map(AccountResponse::from).collect()))
}

/// `GET /contas/{id}`
pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AccountResponse>> {
    let id = parse_account_id(&id)?;
    Ok(Json(state.accounts.get_account(id).await?.into()))
}

/// `GET /contas/{id}/transferencias`
pub async fn account_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ApiResult<Json<Vec<TransferResponse>>> {
    let id = parse_account_id(&id)?;
    let Query(params) = params.map_err(|e| {
        debug!(error = %e.body_text(), "Rejected history query");
        ApiErrorResponse::bad_request("INVALID_REQUEST", "Parâmetros de consulta inválidos")
    })?;

    let transfers = state.accounts.history(id, params.limite).await?;
    Ok(Json(transfers.into_iter().map(TransferResponse::from).collect()))
}

/// `POST /transferencias`
///
/// 201 for a newly committed transfer, 200 when the request id had already
/// committed (replay).
pub async fn create_transfer(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    headers: HeaderMap,
    body: Result<Json<TransferBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TransferResponse>)> {
    let Json(body) = body.map_err(|e| {
        debug!(error = %e.body_text(), "Rejected transfer body");
        ApiErrorResponse::bad_request("INVALID_TRANSFER", "Corpo da transferência inválido")
    })?;

    let header_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .map(|value| {
            value.to_str().map(str::to_owned).map_err(|_| {
                ApiErrorResponse::bad_request(
                    "INVALID_TRANSFER",
                    "Idempotency-Key deve conter apenas caracteres ASCII imprimíveis",
                )
            })
        })
        .transpose()?;

    let supplied = match (body.request_id, header_key) {
        (Some(body_key), Some(header_key)) if body_key != header_key => {
            return Err(ApiErrorResponse::bad_request(
                "INVALID_TRANSFER",
                "requestId e Idempotency-Key divergem",
            ));
        }
        (body_key, header_key) => body_key.or(header_key),
    };

    let request = TransferRequest {
        request_id: state.transfers.resolve_request_id(supplied)?,
        source: AccountId(body.source_account_id),
        destination: AccountId(body.destination_account_id),
        amount: body.amount,
    };
    debug!(user = %identity.username, request_id = %request.request_id, "Transfer submitted");

    let outcome = state.transfers.execute(request).await?;
    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome.transfer.into())))
}

/// `GET /transferencias/{request_id}`
pub async fn get_transfer(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> ApiResult<Json<TransferResponse>> {
    let request_id =
        RequestId::new(request_id).map_err(|_| ApiErrorResponse::transfer_not_found())?;

    state
        .transfers
        .find(&request_id)
        .await?
        .map(|transfer| Json(transfer.into()))
        .ok_or_else(ApiErrorResponse::transfer_not_found)
}

/// `GET /health` - 503 while the account store is unreachable.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match state.accounts.check_health().await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(err) => {
            warn!(error = %err, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE")
        }
    }
}

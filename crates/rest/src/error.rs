//! REST error responses.
//!
//! Every failure is rendered as `{"erro": <message>, "codigo": <code>}`
//! where `codigo` is the stable code of the domain error.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use cofre_core::error::{AccountError, AuthError, TransferError};

/// Error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable message.
    pub erro: String,
    /// Stable error code.
    pub codigo: String,
}

/// Error response: status code plus body.
#[derive(Debug, Clone)]
pub struct ApiErrorResponse {
    pub status: StatusCode,
    pub error: ApiError,
}

impl ApiErrorResponse {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error: ApiError {
                erro: message.into(),
                codigo: code.into(),
            },
        }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn account_not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "ACCOUNT_NOT_FOUND",
            "Conta não encontrada",
        )
    }

    pub fn transfer_not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "TRANSFER_NOT_FOUND",
            "Transferência não encontrada",
        )
    }

    pub fn internal_error() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Erro interno",
        )
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

impl From<TransferError> for ApiErrorResponse {
    fn from(err: TransferError) -> Self {
        let status = match &err {
            TransferError::InvalidTransfer(_) => StatusCode::BAD_REQUEST,
            TransferError::AccountNotFound(_) => StatusCode::NOT_FOUND,
            TransferError::AccountInactive(_) | TransferError::InsufficientFunds { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            TransferError::TransferInProgress(_) | TransferError::TransferAborted { .. } => {
                StatusCode::CONFLICT
            }
            TransferError::FatalConsistency { .. }
            | TransferError::Cancelled
            | TransferError::Storage(_)
            | TransferError::Internal(_) => {
                error!(error = %err, "Transfer failed with internal error");
                return Self::internal_error();
            }
        };
        Self::new(status, err.code(), err.public_message())
    }
}

impl From<AccountError> for ApiErrorResponse {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::NotFound(_) => Self::account_not_found(),
            AccountError::Storage(e) => {
                error!(error = %e, "Account query failed");
                Self::internal_error()
            }
        }
    }
}

impl From<AuthError> for ApiErrorResponse {
    fn from(err: AuthError) -> Self {
        if let AuthError::Issuing(e) = &err {
            error!(error = %e, "Token issuing failed");
            return Self::internal_error();
        }
        Self::new(StatusCode::UNAUTHORIZED, err.code(), err.public_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cofre_core::models::{AccountId, RequestId};
    use rstest::rstest;
    use rust_decimal::Decimal;

    #[rstest]
    #[case(TransferError::InvalidTransfer("x".into()), StatusCode::BAD_REQUEST, "INVALID_TRANSFER")]
    #[case(TransferError::AccountNotFound(AccountId(1)), StatusCode::NOT_FOUND, "ACCOUNT_NOT_FOUND")]
    #[case(TransferError::AccountInactive(AccountId(1)), StatusCode::UNPROCESSABLE_ENTITY, "ACCOUNT_INACTIVE")]
    #[case(
        TransferError::InsufficientFunds { account: AccountId(1), balance: Decimal::ZERO, requested: Decimal::ONE },
        StatusCode::UNPROCESSABLE_ENTITY,
        "INSUFFICIENT_FUNDS"
    )]
    #[case(
        TransferError::TransferInProgress(RequestId::new("r").unwrap()),
        StatusCode::CONFLICT,
        "TRANSFER_IN_PROGRESS"
    )]
    #[case(
        TransferError::TransferAborted { request_id: RequestId::new("r").unwrap(), attempts: 5, reason: "conflict".into() },
        StatusCode::CONFLICT,
        "TRANSFER_ABORTED"
    )]
    #[case(TransferError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")]
    fn test_transfer_error_status_mapping(
        #[case] err: TransferError,
        #[case] status: StatusCode,
        #[case] code: &str,
    ) {
        let response = ApiErrorResponse::from(err);
        assert_eq!(response.status, status);
        assert_eq!(response.error.codigo, code);
    }

    // Test critique: les détails d'une erreur fatale ne fuient pas
    #[test]
    fn test_fatal_consistency_is_opaque() {
        let response = ApiErrorResponse::from(TransferError::FatalConsistency {
            request_id: RequestId::new("r").unwrap(),
            source_account: AccountId(1),
            destination_account: AccountId(2),
            amount: Decimal::ONE,
            reason: "compensation exhausted".into(),
        });
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!response.error.erro.contains("compensation"));
    }

    #[test]
    fn test_auth_errors_are_401() {
        for err in [AuthError::MissingCredential, AuthError::Expired, AuthError::InvalidSignature] {
            let response = ApiErrorResponse::from(err);
            assert_eq!(response.status, StatusCode::UNAUTHORIZED);
            assert_eq!(response.error.codigo, "UNAUTHENTICATED");
        }
    }
}

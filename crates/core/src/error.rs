//! Error types for the banking domain layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`StorageError`] - Account store and ledger errors
//! - [`AccountError`] - Account query errors
//! - [`TransferError`] - Transfer engine errors (the caller-visible taxonomy)
//! - [`AuthError`] - Authentication gate errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries. Every caller-visible
//! error exposes a stable [`code`](TransferError::code) that protocol
//! adapters forward unchanged.

use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{AccountId, RequestId};

/// Caller-facing message of every internal failure.
const INTERNAL_MESSAGE: &str = "Erro interno";

// =============================================================================
// Storage Errors
// =============================================================================

/// Account store and transfer ledger errors.
///
/// `VersionConflict` and `NotFound` are part of the conditional update
/// contract; everything else is an infrastructure failure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    /// Failed to establish database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// Query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Requested account does not exist.
    #[error("Account not found: {0}")]
    NotFound(AccountId),

    /// The stored version no longer matches the expected one.
    #[error("Version conflict on account {account}: expected {expected}, found {found:?}")]
    VersionConflict {
        /// Account whose version moved.
        account: AccountId,
        /// Version the caller read.
        expected: i64,
        /// Version currently stored, when known.
        found: Option<i64>,
    },

    /// Database constraint was violated (unique, check, overflow).
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// Transaction commit/rollback failed.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Row data could not be converted into a domain model.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A store call did not complete within its deadline.
    #[error("Storage call timed out after {0:?}")]
    Timeout(Duration),
}

// =============================================================================
// Account Errors
// =============================================================================

/// Errors returned by the account query service.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AccountError {
    /// Account does not exist.
    #[error("Account not found: {0}")]
    NotFound(AccountId),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for AccountError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => AccountError::NotFound(id),
            other => AccountError::Storage(other),
        }
    }
}

impl AccountError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AccountError::NotFound(_) => "ACCOUNT_NOT_FOUND",
            AccountError::Storage(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to callers.
    pub fn public_message(&self) -> String {
        match self {
            AccountError::NotFound(_) => "Conta não encontrada".to_string(),
            AccountError::Storage(_) => INTERNAL_MESSAGE.to_string(),
        }
    }
}

// =============================================================================
// Transfer Errors
// =============================================================================

/// Transfer engine errors.
///
/// Version conflicts are recovered internally by the retry loop and only
/// escape as part of [`TransferError::TransferAborted`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransferError {
    /// Bad input shape or values.
    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),

    /// Source or destination account does not exist.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Source or destination account is inactive.
    #[error("Account {0} is inactive")]
    AccountInactive(AccountId),

    /// Source balance does not cover the amount.
    #[error("Insufficient funds in account {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        balance: Decimal,
        requested: Decimal,
    },

    /// Another submission with the same request id is still running.
    #[error("Transfer {0} is already in progress")]
    TransferInProgress(RequestId),

    /// Retries exhausted; any partial mutation was compensated.
    #[error("Transfer {request_id} aborted after {attempts} attempt(s): {reason}")]
    TransferAborted {
        request_id: RequestId,
        attempts: u32,
        reason: String,
    },

    /// Compensation failed: the source was debited and could not be restored.
    ///
    /// Requires operator intervention.
    #[error("Fatal consistency error on transfer {request_id}: {reason}")]
    FatalConsistency {
        request_id: RequestId,
        source_account: AccountId,
        destination_account: AccountId,
        amount: Decimal,
        reason: String,
    },

    /// The caller went away before any mutation was issued.
    #[error("Transfer cancelled before debit")]
    Cancelled,

    /// Storage failure outside the conditional update contract.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Unexpected internal error (e.g. the pipeline task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransferError {
    /// Stable error code forwarded by protocol adapters.
    ///
    /// Fatal and infrastructure failures collapse to `INTERNAL_ERROR` so
    /// callers never see consistency details.
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidTransfer(_) => "INVALID_TRANSFER",
            TransferError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            TransferError::AccountInactive(_) => "ACCOUNT_INACTIVE",
            TransferError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TransferError::TransferInProgress(_) => "TRANSFER_IN_PROGRESS",
            TransferError::TransferAborted { .. } => "TRANSFER_ABORTED",
            TransferError::FatalConsistency { .. }
            | TransferError::Cancelled
            | TransferError::Storage(_)
            | TransferError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Business-rule failure: nothing was applied and retrying the same
    /// request unchanged will fail the same way.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            TransferError::InvalidTransfer(_)
                | TransferError::AccountNotFound(_)
                | TransferError::AccountInactive(_)
                | TransferError::InsufficientFunds { .. }
        )
    }

    /// Message safe to show to callers.
    ///
    /// [`Display`](std::fmt::Display) is meant for logs and carries
    /// internal details; this one does not.
    pub fn public_message(&self) -> String {
        match self {
            TransferError::InvalidTransfer(detail) => format!("Transferência inválida: {}", detail),
            TransferError::AccountNotFound(_) => "Conta não encontrada".to_string(),
            TransferError::AccountInactive(id) => format!("Conta {} inativa", id),
            TransferError::InsufficientFunds { .. } => "Saldo insuficiente".to_string(),
            TransferError::TransferInProgress(_) => {
                "Transferência já em processamento".to_string()
            }
            TransferError::TransferAborted { .. } => {
                "Transferência abortada, nenhum valor foi movimentado".to_string()
            }
            TransferError::FatalConsistency { .. }
            | TransferError::Cancelled
            | TransferError::Storage(_)
            | TransferError::Internal(_) => INTERNAL_MESSAGE.to_string(),
        }
    }
}

// =============================================================================
// Auth Errors
// =============================================================================

/// Authentication gate failures. All of them mean "Unauthenticated".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No credential was presented.
    #[error("Missing bearer token")]
    MissingCredential,

    /// Header is not `Bearer <token>` or the token cannot be decoded.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Signature does not verify against the configured secret.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// Token `exp` is in the past.
    #[error("Token expired")]
    Expired,

    /// Username and password do not match a known user.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Token could not be minted.
    #[error("Token issuing failed: {0}")]
    Issuing(String),
}

impl AuthError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Issuing(_) => "INTERNAL_ERROR",
            _ => "UNAUTHENTICATED",
        }
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing",
            AuthError::Malformed(_) => "malformed",
            AuthError::InvalidSignature => "signature",
            AuthError::Expired => "expired",
            AuthError::InvalidCredentials => "credentials",
            AuthError::Issuing(_) => "issuing",
        }
    }

    /// Message safe to show to callers.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "Token não fornecido",
            AuthError::Expired => "Token expirado",
            AuthError::Malformed(_) | AuthError::InvalidSignature => "Token inválido",
            AuthError::InvalidCredentials => "Credenciais inválidas",
            AuthError::Issuing(_) => INTERNAL_MESSAGE,
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for account queries.
pub type AccountResult<T> = Result<T, AccountError>;

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Result type for authentication.
pub type AuthResult<T> = Result<T, AuthError>;

//! GraphQL type definitions.

use async_graphql::{EmptySubscription, Enum, InputObject, Schema, SimpleObject};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use cofre_core::auth::Identity;
use cofre_core::error::AuthError;
use cofre_core::models::{Transfer, TransferStatus};
use cofre_core::services::AccountView;

use crate::schema::{MutationRoot, QueryRoot};

/// The Cofre GraphQL schema type.
pub type CofreSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Authentication outcome of the HTTP request carrying a GraphQL operation.
///
/// Attached as request data by the HTTP handler; resolvers decide whether
/// they need it.
#[derive(Debug, Clone)]
pub struct Caller(pub Result<Identity, AuthError>);

/// Whether queries may run without a bearer token.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryAccess {
    pub public: bool,
}

/// Amounts are exposed as `Float`; inputs stay exact (`Decimal`).
fn float(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

/// Bank account.
#[derive(SimpleObject, Debug, Clone, PartialEq)]
pub struct Conta {
    pub id: i64,
    pub titular: String,
    pub saldo: f64,
    pub ativa: bool,
}

impl From<AccountView> for Conta {
    fn from(view: AccountView) -> Self {
        Self {
            id: view.id.0,
            titular: view.holder_name,
            saldo: float(view.balance),
            ativa: view.active,
        }
    }
}

/// Transfer lifecycle status.
#[derive(Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusTransferencia {
    Pending,
    Committed,
    Rejected,
    Aborted,
    Failed,
}

impl From<TransferStatus> for StatusTransferencia {
    fn from(status: TransferStatus) -> Self {
        match status {
            TransferStatus::Pending => StatusTransferencia::Pending,
            TransferStatus::Committed => StatusTransferencia::Committed,
            TransferStatus::Rejected => StatusTransferencia::Rejected,
            TransferStatus::Aborted => StatusTransferencia::Aborted,
            TransferStatus::Failed => StatusTransferencia::Failed,
        }
    }
}

/// Transfer record.
#[derive(SimpleObject, Debug, Clone, PartialEq)]
pub struct Transferencia {
    pub request_id: String,
    pub source_account_id: i64,
    pub destination_account_id: i64,
    pub amount: f64,
    pub status: StatusTransferencia,
    /// Source balance right after the debit (committed transfers).
    pub source_balance: Option<f64>,
    /// Destination balance right after the credit (committed transfers).
    pub destination_balance: Option<f64>,
    pub failure: Option<String>,
    /// `true` when this response replays an earlier commit.
    pub replayed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transferencia {
    pub fn new(transfer: Transfer, replayed: bool) -> Self {
        Self {
            request_id: transfer.request_id.into(),
            source_account_id: transfer.source.0,
            destination_account_id: transfer.destination.0,
            amount: float(transfer.amount),
            status: transfer.status.into(),
            source_balance: transfer.source_balance.map(float),
            destination_balance: transfer.destination_balance.map(float),
            failure: transfer.failure,
            replayed,
            created_at: transfer.created_at,
            updated_at: transfer.updated_at,
        }
    }
}

impl From<Transfer> for Transferencia {
    fn from(transfer: Transfer) -> Self {
        Self::new(transfer, false)
    }
}

/// Input of `Mutation.transferir`.
#[derive(InputObject, Debug, Clone)]
pub struct TransferenciaInput {
    pub source_account_id: i64,
    pub destination_account_id: i64,
    pub amount: Decimal,
    /// Idempotency key; resubmitting it never applies the transfer twice.
    pub request_id: Option<String>,
}

//! Request and response bodies.
//!
//! Accounts keep the historical Portuguese field names
//! (`titular`, `saldo`, `ativa`); transfers use camelCase.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cofre_core::models::Transfer;
use cofre_core::services::AccountView;

/// `POST /transferencias` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferBody {
    pub source_account_id: i64,
    pub destination_account_id: i64,
    pub amount: Decimal,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// `POST /login` body. `senha` is accepted for `password`.
#[derive(Deserialize)]
pub struct LoginBody {
    pub username: String,
    #[serde(alias = "senha")]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// `GET /contas/{id}/transferencias` query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    pub limite: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountResponse {
    pub id: i64,
    pub titular: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub saldo: Decimal,
    pub ativa: bool,
}

impl From<AccountView> for AccountResponse {
    fn from(view: AccountView) -> Self {
        Self {
            id: view.id.0,
            titular: view.holder_name,
            saldo: view.balance,
            ativa: view.active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub request_id: String,
    pub source_account_id: i64,
    pub destination_account_id: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub status: &'static str,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub source_balance: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub destination_balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Transfer> for TransferResponse {
    fn from(transfer: Transfer) -> Self {
        Self {
            request_id: transfer.request_id.into(),
            source_account_id: transfer.source.0,
            destination_account_id: transfer.destination.0,
            amount: transfer.amount,
            status: transfer.status.as_str(),
            source_balance: transfer.source_balance,
            destination_balance: transfer.destination_balance,
            failure: transfer.failure,
            created_at: transfer.created_at,
            updated_at: transfer.updated_at,
        }
    }
}

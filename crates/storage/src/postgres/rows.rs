//! Row types and conversions shared by the PostgreSQL repositories.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use cofre_core::error::StorageError;
use cofre_core::models::{Account, AccountId, RequestId, Transfer};

/// SQLSTATE for `numeric_value_out_of_range`.
const NUMERIC_OUT_OF_RANGE: &str = "22003";

/// Map a sqlx error to the storage error taxonomy.
pub fn storage_error(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db)
            if db.is_unique_violation()
                || db.is_check_violation()
                || db.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE) =>
        {
            StorageError::ConstraintViolation(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StorageError::ConnectionError(e.to_string())
        }
        _ => StorageError::QueryError(e.to_string()),
    }
}

pub const ACCOUNT_COLUMNS: &str =
    "id, holder_name, balance, active, allow_overdraft, version, updated_at";

#[derive(Debug, sqlx::FromRow)]
pub struct AccountRow {
    pub id: i64,
    pub holder_name: String,
    pub balance: Decimal,
    pub active: bool,
    pub allow_overdraft: bool,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: AccountId(row.id),
            holder_name: row.holder_name,
            balance: row.balance,
            active: row.active,
            allow_overdraft: row.allow_overdraft,
            version: row.version,
            updated_at: row.updated_at,
        }
    }
}

pub const TRANSFER_COLUMNS: &str = "request_id, source_account, destination_account, amount, \
     status, source_balance, destination_balance, failure, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
pub struct TransferRow {
    pub request_id: String,
    pub source_account: i64,
    pub destination_account: i64,
    pub amount: Decimal,
    pub status: String,
    pub source_balance: Option<Decimal>,
    pub destination_balance: Option<Decimal>,
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TransferRow> for Transfer {
    type Error = StorageError;

    fn try_from(row: TransferRow) -> Result<Self, Self::Error> {
        let request_id = RequestId::new(row.request_id).map_err(|e| {
            StorageError::SerializationError(format!("transfers.request_id: {}", e))
        })?;
        let status = row
            .status
            .parse()
            .map_err(|e| StorageError::SerializationError(format!("transfers.status: {}", e)))?;

        Ok(Transfer {
            request_id,
            source: AccountId(row.source_account),
            destination: AccountId(row.destination_account),
            amount: row.amount,
            status,
            source_balance: row.source_balance,
            destination_balance: row.destination_balance,
            failure: row.failure,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cofre_core::models::TransferStatus;
    use rust_decimal_macros::dec;

    fn row(request_id: &str, status: &str) -> TransferRow {
        TransferRow {
            request_id: request_id.into(),
            source_account: 1,
            destination_account: 2,
            amount: dec!(30),
            status: status.into(),
            source_balance: Some(dec!(70)),
            destination_balance: Some(dec!(80)),
            failure: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_transfer_row_conversion() {
        let transfer = Transfer::try_from(row("r1", "committed")).unwrap();
        assert_eq!(transfer.status, TransferStatus::Committed);
        assert_eq!(transfer.source, AccountId(1));
        assert_eq!(transfer.destination_balance, Some(dec!(80)));
    }

    // Test critique: données corrompues détectées avec le nom du champ
    #[test]
    fn test_corrupt_rows_are_serialization_errors() {
        let err = Transfer::try_from(row("r1", "exploded")).unwrap_err();
        assert!(matches!(err, StorageError::SerializationError(_)));
        assert!(err.to_string().contains("transfers.status"));

        let err = Transfer::try_from(row("", "pending")).unwrap_err();
        assert!(err.to_string().contains("transfers.request_id"));
    }

    #[test]
    fn test_pool_errors_are_connection_errors() {
        assert!(matches!(
            storage_error(sqlx::Error::PoolTimedOut),
            StorageError::ConnectionError(_)
        ));
        assert!(matches!(
            storage_error(sqlx::Error::RowNotFound),
            StorageError::QueryError(_)
        ));
    }
}

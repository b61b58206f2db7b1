//! Transfer ledger implementation for PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, instrument};

use cofre_core::error::{StorageError, StorageResult};
use cofre_core::models::{AccountId, RequestId, Transfer, TransferRequest, TransferStatus};
use cofre_core::ports::{Reservation, TransferLedger};

use super::database::Database;
use super::rows::{TRANSFER_COLUMNS, TransferRow, storage_error};

/// How many times a reservation is retried when the existing record turns
/// reusable between the insert and the read.
const RESERVE_ATTEMPTS: u32 = 3;

/// PostgreSQL implementation of TransferLedger.
///
/// The primary key on `request_id` arbitrates concurrent reservations.
pub struct PgTransferLedger {
    pool: PgPool,
}

impl PgTransferLedger {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Insert a pending record, or take over a rejected/aborted one.
    ///
    /// Returns `None` when the id is held by a non-reusable record.
    async fn try_acquire(&self, request: &TransferRequest) -> StorageResult<Option<Transfer>> {
        let sql = format!(
            r#"
            INSERT INTO transfers
                (request_id, source_account, destination_account, amount, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (request_id) DO UPDATE SET
                source_account = EXCLUDED.source_account,
                destination_account = EXCLUDED.destination_account,
                amount = EXCLUDED.amount,
                status = EXCLUDED.status,
                source_balance = NULL,
                destination_balance = NULL,
                failure = NULL,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at
            WHERE transfers.status IN ('{}', '{}')
            RETURNING {}
            "#,
            TransferStatus::Rejected.as_str(),
            TransferStatus::Aborted.as_str(),
            TRANSFER_COLUMNS
        );

        sqlx::query_as::<_, TransferRow>(&sql)
            .bind(request.request_id.as_str())
            .bind(request.source.0)
            .bind(request.destination.0)
            .bind(request.amount)
            .bind(TransferStatus::Pending.as_str())
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(Transfer::try_from)
            .transpose()
    }
}

#[async_trait]
impl TransferLedger for PgTransferLedger {
    #[instrument(skip_all, fields(request_id = %request.request_id))]
    async fn reserve(&self, request: &TransferRequest) -> StorageResult<Reservation> {
        for _ in 0..RESERVE_ATTEMPTS {
            if let Some(pending) = self.try_acquire(request).await? {
                return Ok(Reservation::Acquired(pending));
            }

            match self.get(&request.request_id).await? {
                Some(existing) if !existing.status.is_reusable() => {
                    return Ok(Reservation::Existing(existing));
                }
                // Released or removed in between; try again.
                _ => debug!("Ledger record changed during reservation, retrying"),
            }
        }

        Err(StorageError::TransactionError(format!(
            "could not reserve request id '{}'",
            request.request_id
        )))
    }

    async fn complete(&self, transfer: &Transfer) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE transfers
            SET status = $2, source_balance = $3, destination_balance = $4,
                failure = $5, updated_at = $6
            WHERE request_id = $1
            "#,
        )
        .bind(transfer.request_id.as_str())
        .bind(transfer.status.as_str())
        .bind(transfer.source_balance)
        .bind(transfer.destination_balance)
        .bind(&transfer.failure)
        .bind(transfer.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::QueryError(format!(
                "no ledger record for request id '{}'",
                transfer.request_id
            )));
        }
        Ok(())
    }

    async fn get(&self, request_id: &RequestId) -> StorageResult<Option<Transfer>> {
        let sql = format!(
            "SELECT {} FROM transfers WHERE request_id = $1",
            TRANSFER_COLUMNS
        );
        sqlx::query_as::<_, TransferRow>(&sql)
            .bind(request_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(Transfer::try_from)
            .transpose()
    }

    async fn list_for_account(
        &self,
        account: AccountId,
        limit: u32,
    ) -> StorageResult<Vec<Transfer>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM transfers
            WHERE source_account = $1 OR destination_account = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
            TRANSFER_COLUMNS
        );
        let rows = sqlx::query_as::<_, TransferRow>(&sql)
            .bind(account.0)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        rows.into_iter().map(Transfer::try_from).collect()
    }
}

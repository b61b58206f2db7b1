//! Account store implementation for PostgreSQL.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use cofre_core::error::{StorageError, StorageResult};
use cofre_core::models::{Account, AccountId, INITIAL_VERSION, NewAccount};
use cofre_core::ports::AccountStore;

use super::database::{self, Database};
use super::rows::{ACCOUNT_COLUMNS, AccountRow, storage_error};

/// PostgreSQL implementation of AccountStore.
///
/// Conditional updates are single `UPDATE ... WHERE version = $n` statements,
/// so the row lock taken by PostgreSQL serializes writers of one account.
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Distinguish "unknown id" from "version moved" after an update
    /// matched no row.
    async fn missed_update(&self, id: AccountId, expected_version: i64) -> StorageError {
        let found: Result<Option<(i64,)>, _> =
            sqlx::query_as("SELECT version FROM accounts WHERE id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await;

        match found {
            Ok(Some((version,))) => StorageError::VersionConflict {
                account: id,
                expected: expected_version,
                found: Some(version),
            },
            Ok(None) => StorageError::NotFound(id),
            Err(e) => storage_error(e),
        }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn get(&self, id: AccountId) -> StorageResult<Account> {
        let sql = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(Account::from)
            .ok_or(StorageError::NotFound(id))
    }

    async fn list(&self) -> StorageResult<Vec<Account>> {
        let sql = format!("SELECT {} FROM accounts ORDER BY id ASC", ACCOUNT_COLUMNS);
        let rows = sqlx::query_as::<_, AccountRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(rows.into_iter().map(Account::from).collect())
    }

    #[instrument(skip(self))]
    async fn conditional_update_balance(
        &self,
        id: AccountId,
        expected_version: i64,
        delta: Decimal,
    ) -> StorageResult<Account> {
        let sql = format!(
            r#"
            UPDATE accounts
            SET balance = balance + $3, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id.0)
            .bind(expected_version)
            .bind(delta)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        match row {
            Some(row) => Ok(row.into()),
            None => Err(self.missed_update(id, expected_version).await),
        }
    }

    async fn provision(&self, account: NewAccount) -> StorageResult<Account> {
        let sql = format!(
            r#"
            INSERT INTO accounts (holder_name, balance, active, allow_overdraft, version)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(&account.holder_name)
            .bind(account.balance)
            .bind(account.active)
            .bind(account.allow_overdraft)
            .bind(INITIAL_VERSION)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.into())
    }

    async fn ping(&self) -> StorageResult<()> {
        database::ping(&self.pool).await
    }
}

//! Port trait for account storage.
//!
//! This trait defines the storage interface used by the domain layer.
//! Implementations live in the infrastructure layer (`cofre-storage`).

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::StorageResult;
use crate::models::{Account, AccountId, NewAccount};

/// Durable keyed storage of account records.
///
/// # Consistency contract
///
/// - Calls for different account ids may proceed concurrently.
/// - Calls for the same account id are linearizable: a later commit
///   observes the effect of every earlier one.
/// - [`conditional_update_balance`](AccountStore::conditional_update_balance)
///   is the only way to change a balance.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Get an account by id.
    ///
    /// Fails with `StorageError::NotFound` when the id is unknown.
    async fn get(&self, id: AccountId) -> StorageResult<Account>;

    /// Read-only snapshot of every account, ordered by id ascending.
    async fn list(&self) -> StorageResult<Vec<Account>>;

    /// Atomically add `delta` to the balance and bump the version, but only
    /// if the stored version still equals `expected_version`.
    ///
    /// Fails with `StorageError::VersionConflict` when the version moved and
    /// `StorageError::NotFound` when the id is unknown.
    async fn conditional_update_balance(
        &self,
        id: AccountId,
        expected_version: i64,
        delta: Decimal,
    ) -> StorageResult<Account>;

    /// Create an account (administrative provisioning).
    ///
    /// The store assigns the id.
    async fn provision(&self, account: NewAccount) -> StorageResult<Account>;

    /// Check that the backing store answers.
    ///
    /// Stores that live in process memory are always reachable.
    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}

//! Port trait for the transfer ledger.
//!
//! The ledger is both the audit trail of transfers and the idempotency
//! registry keyed by request id.

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::models::{AccountId, RequestId, Transfer, TransferRequest};

/// Outcome of reserving a request id.
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// The id is now held by the caller as a `Pending` record.
    Acquired(Transfer),
    /// The id is held by a previous submission that is pending, committed
    /// or failed.
    Existing(Transfer),
}

/// Transfer audit and idempotency storage.
#[async_trait]
pub trait TransferLedger: Send + Sync {
    /// Atomically reserve `request.request_id`.
    ///
    /// A new id, or one whose record is `Rejected`/`Aborted`, becomes a fresh
    /// `Pending` record and yields [`Reservation::Acquired`]. Any other
    /// existing record is returned untouched as [`Reservation::Existing`].
    async fn reserve(&self, request: &TransferRequest) -> StorageResult<Reservation>;

    /// Store the final state of a reserved transfer.
    async fn complete(&self, transfer: &Transfer) -> StorageResult<()>;

    /// Get a transfer record by request id.
    async fn get(&self, request_id: &RequestId) -> StorageResult<Option<Transfer>>;

    /// Most recent transfers touching an account, newest first.
    async fn list_for_account(&self, account: AccountId, limit: u32)
    -> StorageResult<Vec<Transfer>>;
}

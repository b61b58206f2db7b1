//! In-memory transfer ledger.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use cofre_core::error::StorageResult;
use cofre_core::models::{AccountId, RequestId, Transfer, TransferRequest};
use cofre_core::ports::{Reservation, TransferLedger};

/// Transfer ledger keyed by request id.
///
/// Reservation goes through the map entry API, so two submissions racing
/// on the same request id see exactly one `Acquired`.
#[derive(Debug, Default)]
pub struct InMemoryTransferLedger {
    records: DashMap<RequestId, Transfer>,
}

impl InMemoryTransferLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransferLedger for InMemoryTransferLedger {
    async fn reserve(&self, request: &TransferRequest) -> StorageResult<Reservation> {
        match self.records.entry(request.request_id.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().status.is_reusable() {
                    let pending = Transfer::pending(request);
                    entry.insert(pending.clone());
                    Ok(Reservation::Acquired(pending))
                } else {
                    Ok(Reservation::Existing(entry.get().clone()))
                }
            }
            Entry::Vacant(entry) => {
                let pending = Transfer::pending(request);
                entry.insert(pending.clone());
                Ok(Reservation::Acquired(pending))
            }
        }
    }

    async fn complete(&self, transfer: &Transfer) -> StorageResult<()> {
        self.records
            .insert(transfer.request_id.clone(), transfer.clone());
        Ok(())
    }

    async fn get(&self, request_id: &RequestId) -> StorageResult<Option<Transfer>> {
        Ok(self.records.get(request_id).map(|entry| entry.value().clone()))
    }

    async fn list_for_account(
        &self,
        account: AccountId,
        limit: u32,
    ) -> StorageResult<Vec<Transfer>> {
        let mut transfers: Vec<Transfer> = self
            .records
            .iter()
            .filter(|entry| entry.source == account || entry.destination == account)
            .map(|entry| entry.value().clone())
            .collect();
        transfers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        transfers.truncate(limit as usize);
        Ok(transfers)
    }
}

//! In-memory account store.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;

use cofre_core::error::{StorageError, StorageResult};
use cofre_core::models::{Account, AccountId, INITIAL_VERSION, NewAccount};
use cofre_core::ports::AccountStore;

/// Account store keeping every record in a concurrent map.
///
/// The entry lock held during a conditional update makes the version
/// check and the write a single atomic step for that account.
#[derive(Debug)]
pub struct InMemoryAccountStore {
    accounts: DashMap<AccountId, Account>,
    next_id: AtomicI64,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Sum of every balance (conservation checks).
    pub fn total_balance(&self) -> Decimal {
        self.accounts.iter().map(|entry| entry.value().balance).sum()
    }
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get(&self, id: AccountId) -> StorageResult<Account> {
        self.accounts
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(StorageError::NotFound(id))
    }

    async fn list(&self) -> StorageResult<Vec<Account>> {
        let mut accounts: Vec<Account> = self
            .accounts
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        accounts.sort_by_key(|account| account.id);
        Ok(accounts)
    }

    async fn conditional_update_balance(
        &self,
        id: AccountId,
        expected_version: i64,
        delta: Decimal,
    ) -> StorageResult<Account> {
        let mut entry = self.accounts.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        let account = entry.value_mut();

        if account.version != expected_version {
            return Err(StorageError::VersionConflict {
                account: id,
                expected: expected_version,
                found: Some(account.version),
            });
        }

        account.balance = account.balance.checked_add(delta).ok_or_else(|| {
            StorageError::ConstraintViolation(format!("balance overflow on account {}", id))
        })?;
        account.version += 1;
        account.updated_at = Utc::now();

        Ok(account.clone())
    }

    async fn provision(&self, account: NewAccount) -> StorageResult<Account> {
        let id = AccountId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let account = Account {
            id,
            holder_name: account.holder_name,
            balance: account.balance,
            active: account.active,
            allow_overdraft: account.allow_overdraft,
            version: INITIAL_VERSION,
            updated_at: Utc::now(),
        };
        self.accounts.insert(id, account.clone());
        Ok(account)
    }
}

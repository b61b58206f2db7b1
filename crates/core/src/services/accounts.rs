//! Account query service - read-only views over the account store.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;

use crate::error::{AccountError, AccountResult};
use crate::models::{Account, AccountId, Transfer};
use crate::ports::{AccountStore, TransferLedger};

/// Default number of transfers returned by [`AccountQueryService::history`].
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Maximum number of transfers returned by [`AccountQueryService::history`].
pub const MAX_HISTORY_LIMIT: u32 = 200;

/// Public projection of an account.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: AccountId,
    pub holder_name: String,
    pub balance: Decimal,
    pub active: bool,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            holder_name: account.holder_name,
            balance: account.balance,
            active: account.active,
        }
    }
}

/// Read-only account queries. No side effects.
#[derive(Clone)]
pub struct AccountQueryService {
    store: Arc<dyn AccountStore>,
    ledger: Arc<dyn TransferLedger>,
}

impl AccountQueryService {
    pub fn new(store: Arc<dyn AccountStore>, ledger: Arc<dyn TransferLedger>) -> Self {
        Self { store, ledger }
    }

    /// Every account, ordered by id.
    #[instrument(skip(self))]
    pub async fn list_accounts(&self) -> AccountResult<Vec<AccountView>> {
        let accounts = self.store.list().await?;
        Ok(accounts.into_iter().map(AccountView::from).collect())
    }

    #[instrument(skip(self))]
    pub async fn get_account(&self, id: AccountId) -> AccountResult<AccountView> {
        Ok(self.store.get(id).await?.into())
    }

    /// Most recent transfers touching an account, newest first.
    ///
    /// `limit` defaults to [`DEFAULT_HISTORY_LIMIT`] and is clamped to
    /// `1..=MAX_HISTORY_LIMIT`.
    #[instrument(skip(self))]
    pub async fn history(&self, id: AccountId, limit: Option<u32>) -> AccountResult<Vec<Transfer>> {
        // Unknown accounts are a not-found, not an empty history.
        self.store.get(id).await?;

        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.ledger
            .list_for_account(id, limit)
            .await
            .map_err(AccountError::from)
    }

    /// Whether the account store is reachable. Backs the `/health` routes.
    #[instrument(skip(self))]
    pub async fn check_health(&self) -> AccountResult<()> {
        self.store.ping().await.map_err(AccountError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StorageError, StorageResult};
    use crate::models::{NewAccount, RequestId, TransferRequest};
    use crate::ports::Reservation;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct MockStore {
        accounts: Vec<Account>,
        fail: bool,
    }

    impl MockStore {
        fn new(fail: bool) -> Self {
            let account = |id: i64, name: &str, balance: Decimal, active: bool| Account {
                id: AccountId(id),
                holder_name: name.into(),
                balance,
                active,
                allow_overdraft: false,
                version: 1,
                updated_at: Utc::now(),
            };
            Self {
                accounts: vec![
                    account(1, "Ana", dec!(100), true),
                    account(2, "Bruno", dec!(50.25), false),
                ],
                fail,
            }
        }
    }

    #[async_trait]
    impl AccountStore for MockStore {
        async fn get(&self, id: AccountId) -> StorageResult<Account> {
            if self.fail {
                return Err(StorageError::ConnectionError("pool closed".into()));
            }
            self.accounts
                .iter()
                .find(|a| a.id == id)
                .cloned()
                .ok_or(StorageError::NotFound(id))
        }

        async fn list(&self) -> StorageResult<Vec<Account>> {
            if self.fail {
                return Err(StorageError::ConnectionError("pool closed".into()));
            }
            Ok(self.accounts.clone())
        }

        async fn conditional_update_balance(
            &self,
            _id: AccountId,
            _expected_version: i64,
            _delta: Decimal,
        ) -> StorageResult<Account> {
            unimplemented!("read-only service")
        }

        async fn provision(&self, _account: NewAccount) -> StorageResult<Account> {
            unimplemented!("read-only service")
        }
        async fn ping(&self) -> StorageResult<()> {
            if self.fail {
                return Err(StorageError::ConnectionError("pool closed".into()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockLedger {
        limits: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl TransferLedger for MockLedger {
        async fn reserve(&self, request: &TransferRequest) -> StorageResult<Reservation> {
            Ok(Reservation::Acquired(Transfer::pending(request)))
        }

        async fn complete(&self, _transfer: &Transfer) -> StorageResult<()> {
            Ok(())
        }

        async fn get(&self, _request_id: &RequestId) -> StorageResult<Option<Transfer>> {
            Ok(None)
        }

        async fn list_for_account(
            &self,
            account: AccountId,
            limit: u32,
        ) -> StorageResult<Vec<Transfer>> {
            self.limits.lock().unwrap().push(limit);
            let request = TransferRequest {
                request_id: RequestId::new("r1").unwrap(),
                source: account,
                destination: AccountId(99),
                amount: dec!(1),
            };
            Ok(vec![Transfer::pending(&request)])
        }
    }

    fn service(fail: bool) -> (AccountQueryService, Arc<MockLedger>) {
        let ledger = Arc::new(MockLedger::default());
        (
            AccountQueryService::new(Arc::new(MockStore::new(fail)), ledger.clone()),
            ledger,
        )
    }

    #[tokio::test]
    async fn test_list_accounts_projects_views() {
        let (service, _) = service(false);
        let views = service.list_accounts().await.unwrap();

        assert_eq!(views.len(), 2);
        assert_eq!(views[1].holder_name, "Bruno");
        assert_eq!(views[1].balance, dec!(50.25));
        assert!(!views[1].active);
    }

    #[tokio::test]
    async fn test_get_account_not_found() {
        let (service, _) = service(false);
        assert_eq!(
            service.get_account(AccountId(42)).await,
            Err(AccountError::NotFound(AccountId(42)))
        );
    }

    #[tokio::test]
    async fn test_storage_failure_is_internal() {
        let (service, _) = service(true);
        let err = service.list_accounts().await.unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn test_history_clamps_limit() {
        let (service, ledger) = service(false);

        assert_eq!(service.history(AccountId(1), None).await.unwrap().len(), 1);
        service.history(AccountId(1), Some(0)).await.unwrap();
        service.history(AccountId(1), Some(10_000)).await.unwrap();

        assert_eq!(
            *ledger.limits.lock().unwrap(),
            vec![DEFAULT_HISTORY_LIMIT, 1, MAX_HISTORY_LIMIT]
        );
    }

    #[tokio::test]
    async fn test_history_of_unknown_account_is_not_found() {
        let (service, ledger) = service(false);
        assert_eq!(
            service.history(AccountId(7), None).await,
            Err(AccountError::NotFound(AccountId(7)))
        );
        assert!(ledger.limits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_check_health_reports_store_failure() {
        let (healthy, _) = service(false);
        assert_eq!(healthy.check_health().await, Ok(()));

        let (broken, _) = service(true);
        let err = broken.check_health().await.unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }
}

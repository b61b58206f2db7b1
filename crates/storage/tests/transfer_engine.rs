//! End-to-end transfer tests against the in-memory adapters.
//!
//! These exercise the engine and the stores together under real
//! concurrency (multi-threaded runtime, shared DashMap state).

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use cofre_core::error::{StorageError, StorageResult, TransferError};
use cofre_core::models::{
    Account, AccountId, NewAccount, RequestId, TransferRequest, TransferStatus,
};
use cofre_core::ports::{AccountStore, TransferLedger};
use cofre_core::services::{TransferConfig, TransferEngine};
use cofre_storage::{InMemoryAccountStore, InMemoryTransferLedger};

// =============================================================================
// Helpers
// =============================================================================

fn config() -> TransferConfig {
    TransferConfig {
        max_attempts: 50,
        retry_backoff: Duration::from_millis(1),
        ..TransferConfig::default()
    }
}

async fn provision(store: &InMemoryAccountStore, balances: &[Decimal]) -> Vec<AccountId> {
    let mut ids = Vec::new();
    for (i, balance) in balances.iter().enumerate() {
        let account = store
            .provision(NewAccount::new(format!("Titular {}", i), *balance))
            .await
            .unwrap();
        ids.push(account.id);
    }
    ids
}

fn request(id: impl Into<String>, source: AccountId, destination: AccountId, amount: Decimal) -> TransferRequest {
    TransferRequest {
        request_id: RequestId::new(id).unwrap(),
        source,
        destination,
        amount,
    }
}

struct Harness {
    engine: TransferEngine,
    store: Arc<InMemoryAccountStore>,
    ledger: Arc<InMemoryTransferLedger>,
}

fn harness(config: TransferConfig) -> Harness {
    let store = Arc::new(InMemoryAccountStore::new());
    let ledger = Arc::new(InMemoryTransferLedger::new());
    let engine = TransferEngine::new(config, store.clone(), ledger.clone());
    Harness {
        engine,
        store,
        ledger,
    }
}

// =============================================================================
// Scenario
// =============================================================================

// Test critique: le scénario de référence A=100, B=50
#[tokio::test]
async fn test_reference_scenario() {
    let h = harness(config());
    let ids = provision(&h.store, &[dec!(100), dec!(50)]).await;
    let (a, b) = (ids[0], ids[1]);

    let first = h.engine.execute(request("t1", a, b, dec!(30))).await.unwrap();
    assert_eq!(first.transfer.source_balance, Some(dec!(70)));
    assert_eq!(first.transfer.destination_balance, Some(dec!(80)));

    let err = h
        .engine
        .execute(request("t2", a, b, dec!(100)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
    assert_eq!(h.store.get(a).await.unwrap().balance, dec!(70));
    assert_eq!(h.store.get(b).await.unwrap().balance, dec!(80));

    let replay = h.engine.execute(request("t1", a, b, dec!(30))).await.unwrap();
    assert!(replay.replayed);
    assert_eq!(replay.transfer, first.transfer);
    assert_eq!(h.store.get(a).await.unwrap().balance, dec!(70));
    assert_eq!(h.store.get(b).await.unwrap().balance, dec!(80));
}

// =============================================================================
// Concurrency
// =============================================================================

// Test critique: pas de double dépense depuis une même source
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_no_double_spend_from_one_source() {
    let h = harness(config());
    let ids = provision(&h.store, &[dec!(100), dec!(0), dec!(0), dec!(0)]).await;

    let submissions = (0..20).map(|i| {
        let engine = h.engine.clone();
        let destination = ids[1 + i % 3];
        let req = request(format!("spend-{}", i), ids[0], destination, dec!(10));
        tokio::spawn(async move { engine.execute(req).await })
    });

    let mut committed = 0;
    for result in join_all(submissions).await {
        match result.unwrap() {
            Ok(_) => committed += 1,
            Err(TransferError::InsufficientFunds { .. }) | Err(TransferError::TransferAborted { .. }) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    let source = h.store.get(ids[0]).await.unwrap();
    assert!(committed <= 10);
    assert!(source.balance >= Decimal::ZERO);
    assert_eq!(source.balance, dec!(100) - Decimal::from(committed) * dec!(10));
    assert_eq!(h.store.total_balance(), dec!(100));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_conservation_under_crossing_transfers() {
    let h = harness(config());
    let ids = provision(&h.store, &[dec!(500), dec!(500), dec!(500), dec!(500)]).await;

    let submissions = (0..64).map(|i| {
        let engine = h.engine.clone();
        let source = ids[i % 4];
        let destination = ids[(i * 3 + 1) % 4];
        let amount = Decimal::new(((i % 7) as i64 + 1) * 1250, 2);
        let req = request(format!("cross-{}", i), source, destination, amount);
        tokio::spawn(async move { engine.execute(req).await })
    });
    join_all(submissions).await;

    assert_eq!(h.store.total_balance(), dec!(2000));
    for account in h.store.list().await.unwrap() {
        assert!(account.balance >= Decimal::ZERO, "negative balance on {}", account.id);
    }
}

// Test critique: même identifiant soumis en parallèle, appliqué une seule fois
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_duplicates_apply_once() {
    let h = harness(config());
    let ids = provision(&h.store, &[dec!(100), dec!(50)]).await;

    let submissions = (0..10).map(|_| {
        let engine = h.engine.clone();
        let req = request("dup", ids[0], ids[1], dec!(30));
        tokio::spawn(async move { engine.execute(req).await })
    });

    let mut applied = 0;
    for result in join_all(submissions).await {
        match result.unwrap() {
            Ok(outcome) if !outcome.replayed => applied += 1,
            Ok(_) | Err(TransferError::TransferInProgress(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(h.store.get(ids[0]).await.unwrap().balance, dec!(70));
    assert_eq!(h.store.get(ids[1]).await.unwrap().balance, dec!(80));
    let record = h
        .ledger
        .get(&RequestId::new("dup").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, TransferStatus::Committed);
}

// =============================================================================
// Fault injection
// =============================================================================

/// Store double failing the first `failures` credits to one account.
struct FlakyStore {
    inner: InMemoryAccountStore,
    target: AccountId,
    failures: AtomicU32,
    error: StorageError,
}

#[async_trait]
impl AccountStore for FlakyStore {
    async fn get(&self, id: AccountId) -> StorageResult<Account> {
        self.inner.get(id).await
    }

    async fn list(&self) -> StorageResult<Vec<Account>> {
        self.inner.list().await
    }

    async fn conditional_update_balance(
        &self,
        id: AccountId,
        expected_version: i64,
        delta: Decimal,
    ) -> StorageResult<Account> {
        if id == self.target
            && delta > Decimal::ZERO
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(self.error.clone());
        }
        self.inner
            .conditional_update_balance(id, expected_version, delta)
            .await
    }

    async fn provision(&self, account: NewAccount) -> StorageResult<Account> {
        self.inner.provision(account).await
    }
}

// Test critique: atomicité, tout ou rien malgré un crédit en échec
#[tokio::test]
async fn test_failed_credit_is_fully_reverted() {
    let inner = InMemoryAccountStore::new();
    let ids = provision(&inner, &[dec!(100), dec!(50)]).await;
    let store = Arc::new(FlakyStore {
        inner,
        target: ids[1],
        failures: AtomicU32::new(1),
        error: StorageError::Timeout(Duration::from_secs(2)),
    });
    let ledger = Arc::new(InMemoryTransferLedger::new());
    let engine = TransferEngine::new(config(), store.clone(), ledger.clone());

    let err = engine
        .execute(request("flaky", ids[0], ids[1], dec!(30)))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "TRANSFER_ABORTED");
    assert_eq!(store.get(ids[0]).await.unwrap().balance, dec!(100));
    assert_eq!(store.get(ids[1]).await.unwrap().balance, dec!(50));

    // L'identifiant est libéré: une nouvelle tentative aboutit
    let outcome = engine
        .execute(request("flaky", ids[0], ids[1], dec!(30)))
        .await
        .unwrap();
    assert_eq!(outcome.transfer.destination_balance, Some(dec!(80)));
    assert_eq!(store.inner.total_balance(), dec!(150));
}

#[tokio::test]
async fn test_credit_store_error_is_compensated() {
    let inner = InMemoryAccountStore::new();
    let ids = provision(&inner, &[dec!(100), dec!(50)]).await;
    let store = Arc::new(FlakyStore {
        inner,
        target: ids[1],
        failures: AtomicU32::new(1),
        error: StorageError::QueryError("connection reset".into()),
    });
    let ledger = Arc::new(InMemoryTransferLedger::new());
    let engine = TransferEngine::new(config(), store.clone(), ledger.clone());

    let err = engine
        .execute(request("reset", ids[0], ids[1], dec!(30)))
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::TransferAborted { .. }));
    assert_eq!(store.inner.total_balance(), dec!(150));
    let record = ledger
        .get(&RequestId::new("reset").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, TransferStatus::Aborted);
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    // Test critique: conservation de la somme des soldes
    #[test]
    fn prop_total_balance_is_conserved(
        transfers in prop::collection::vec((0usize..4, 0usize..4, 1i64..20_000), 1..40)
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let h = harness(config());
            let ids = provision(&h.store, &[dec!(100), dec!(100), dec!(100), dec!(100)]).await;

            let submissions = transfers.iter().enumerate().map(|(i, (from, to, cents))| {
                let engine = h.engine.clone();
                let req = request(format!("p-{}", i), ids[*from], ids[*to], Decimal::new(*cents, 2));
                tokio::spawn(async move { engine.execute(req).await })
            });
            join_all(submissions).await;

            assert_eq!(h.store.total_balance(), dec!(400));
            for account in h.store.list().await.unwrap() {
                assert!(account.balance >= Decimal::ZERO);
            }
        });
    }
}

//! Transfer engine - moves money between two accounts.
//!
//! There is no multi-account transaction underneath: the engine commits a
//! transfer as two single-account conditional updates (debit, then credit)
//! and restores the source when the credit cannot be applied.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::{StorageError, StorageResult, TransferError, TransferResult};
use crate::metrics::{
    TransferTimer, record_fatal_consistency_error, record_transfer_aborted,
    record_transfer_committed, record_transfer_conflict, record_transfer_rejected,
    record_transfer_replayed,
};
use crate::models::{Account, AccountId, RequestId, Transfer, TransferRequest, TransferStatus};
use crate::ports::{AccountStore, Reservation, TransferLedger};

// =============================================================================
// Configuration
// =============================================================================

/// Whether a debit may take an account below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverdraftPolicy {
    /// Balances never go negative.
    #[default]
    Disabled,
    /// Accounts flagged `allow_overdraft` may go negative.
    PerAccount,
}

impl OverdraftPolicy {
    fn allows(&self, account: &Account) -> bool {
        match self {
            OverdraftPolicy::Disabled => false,
            OverdraftPolicy::PerAccount => account.allow_overdraft,
        }
    }
}

impl std::str::FromStr for OverdraftPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(OverdraftPolicy::Disabled),
            "per-account" => Ok(OverdraftPolicy::PerAccount),
            other => Err(format!(
                "unknown overdraft policy '{}' (expected 'disabled' or 'per-account')",
                other
            )),
        }
    }
}

/// Where request ids come from when a caller does not supply one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdempotencyPolicy {
    /// Callers must supply a request id.
    #[default]
    Required,
    /// A random id is generated (the submission is then not retry-safe).
    Generate,
}

impl IdempotencyPolicy {
    /// Turn an optional caller-supplied key into a request id.
    pub fn resolve(&self, supplied: Option<String>) -> TransferResult<RequestId> {
        match (supplied, self) {
            (Some(value), _) => RequestId::new(value),
            (None, IdempotencyPolicy::Generate) => Ok(RequestId::generate()),
            (None, IdempotencyPolicy::Required) => Err(TransferError::InvalidTransfer(
                "requestId é obrigatório".into(),
            )),
        }
    }
}

impl std::str::FromStr for IdempotencyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "required" => Ok(IdempotencyPolicy::Required),
            "generate" => Ok(IdempotencyPolicy::Generate),
            other => Err(format!(
                "unknown idempotency policy '{}' (expected 'required' or 'generate')",
                other
            )),
        }
    }
}

/// Configuration for the transfer engine.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Attempts for the debit step (from lookup) and for the credit step.
    pub max_attempts: u32,
    /// Attempts to restore the source after a failed credit.
    pub compensation_attempts: u32,
    /// Deadline applied to every store and ledger call.
    pub store_timeout: Duration,
    /// Base delay of the exponential backoff between attempts.
    pub retry_backoff: Duration,
    pub overdraft: OverdraftPolicy,
    pub idempotency: IdempotencyPolicy,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            compensation_attempts: 10,
            store_timeout: Duration::from_secs(2),
            retry_backoff: Duration::from_millis(10),
            overdraft: OverdraftPolicy::default(),
            idempotency: IdempotencyPolicy::default(),
        }
    }
}

/// Longest backoff step is `retry_backoff * 2^MAX_BACKOFF_SHIFT`.
const MAX_BACKOFF_SHIFT: u32 = 6;

// =============================================================================
// TransferEngine
// =============================================================================

/// Result of a successful [`TransferEngine::execute`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutcome {
    /// The committed record, with post-transfer balances.
    pub transfer: Transfer,
    /// `true` when the request id had already committed and nothing was
    /// applied this time.
    pub replayed: bool,
}

/// Executes transfers between accounts.
///
/// # Flow
///
/// 1. Validate the request shape
/// 2. Reserve the request id in the ledger (idempotency)
/// 3. Read both accounts in ascending id order, check status and funds
/// 4. Debit the source (conditional on its version), retrying from 3 on conflict
/// 5. Credit the destination (conditional on its version), re-reading it on conflict
/// 6. If the credit cannot be applied, credit the source back (compensation)
/// 7. Record the final state in the ledger
///
/// Steps 2 to 7 run on a spawned task: once the debit has been issued the
/// transfer runs to completion even if the caller goes away.
#[derive(Clone)]
pub struct TransferEngine {
    inner: Arc<Inner>,
}

struct Inner {
    config: TransferConfig,
    store: Arc<dyn AccountStore>,
    ledger: Arc<dyn TransferLedger>,
}

impl TransferEngine {
    /// Create an engine. Attempt counts below 1 are raised to 1: every step,
    /// compensation included, is tried at least once.
    pub fn new(
        mut config: TransferConfig,
        store: Arc<dyn AccountStore>,
        ledger: Arc<dyn TransferLedger>,
    ) -> Self {
        config.max_attempts = config.max_attempts.max(1);
        config.compensation_attempts = config.compensation_attempts.max(1);

        Self {
            inner: Arc::new(Inner {
                config,
                store,
                ledger,
            }),
        }
    }

    /// Resolve the request id of a submission per the idempotency policy.
    pub fn resolve_request_id(&self, supplied: Option<String>) -> TransferResult<RequestId> {
        self.inner.config.idempotency.resolve(supplied)
    }

    /// Execute a transfer.
    ///
    /// Dropping the returned future before the debit is issued cancels the
    /// transfer and releases its request id.
    pub async fn execute(&self, request: TransferRequest) -> TransferResult<TransferOutcome> {
        if let Err(e) = request.validate() {
            debug!(request_id = %request.request_id, error = %e, "Transfer rejected at validation");
            record_transfer_rejected(e.code());
            return Err(e);
        }

        // Held by this future only; dropping it closes the channel.
        let (cancel_guard, cancelled) = oneshot::channel::<()>();

        let span = info_span!(
            "transfer",
            request_id = %request.request_id,
            source = %request.source,
            destination = %request.destination,
        );
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run(request, cancelled).await }.instrument(span));

        let result = handle
            .await
            .map_err(|e| TransferError::Internal(format!("transfer task failed: {}", e)));
        drop(cancel_guard);
        result?
    }

    /// Look up a transfer record by request id.
    pub async fn find(&self, request_id: &RequestId) -> TransferResult<Option<Transfer>> {
        Ok(self.inner.call(self.inner.ledger.get(request_id)).await?)
    }
}

// -----------------------------------------------------------------------------
// Pipeline
// -----------------------------------------------------------------------------

impl Inner {
    async fn run(
        &self,
        request: TransferRequest,
        mut cancelled: oneshot::Receiver<()>,
    ) -> TransferResult<TransferOutcome> {
        let _timer = TransferTimer::new();

        let pending = match self.call(self.ledger.reserve(&request)).await? {
            Reservation::Acquired(pending) => pending,
            Reservation::Existing(previous) => return self.resume(&request, previous),
        };

        match self.apply(&request, &mut cancelled).await {
            Ok((source, destination)) => {
                let transfer = pending.committed(source.balance, destination.balance);
                if let Err(e) = self.call(self.ledger.complete(&transfer)).await {
                    // Both sides are applied; the record stays pending and
                    // blocks resubmissions until an operator resolves it.
                    error!(error = %e, "Failed to record committed transfer in ledger");
                }
                record_transfer_committed();
                info!(
                    amount = %request.amount,
                    source_balance = %source.balance,
                    destination_balance = %destination.balance,
                    "✅ Transfer committed"
                );
                Ok(TransferOutcome {
                    transfer,
                    replayed: false,
                })
            }
            Err(e) => {
                let status = match &e {
                    TransferError::FatalConsistency { .. } => TransferStatus::Failed,
                    TransferError::TransferAborted { .. } => {
                        warn!(error = %e, "Transfer aborted");
                        record_transfer_aborted();
                        TransferStatus::Aborted
                    }
                    TransferError::Cancelled => {
                        info!("Transfer cancelled before debit");
                        TransferStatus::Rejected
                    }
                    e if e.is_rejection() => {
                        debug!(error = %e, "Transfer rejected");
                        record_transfer_rejected(e.code());
                        TransferStatus::Rejected
                    }
                    // Nothing was applied.
                    _ => {
                        warn!(error = %e, "Transfer failed before debit");
                        TransferStatus::Aborted
                    }
                };

                let failure = match &e {
                    TransferError::Cancelled => "cancelled".to_string(),
                    other => other.to_string(),
                };
                if let Err(ledger_err) = self
                    .call(self.ledger.complete(&pending.finished(status, failure)))
                    .await
                {
                    error!(error = %ledger_err, status = status.as_str(), "Failed to record transfer outcome in ledger");
                }
                Err(e)
            }
        }
    }

    /// Answer a submission whose request id is already held.
    fn resume(
        &self,
        request: &TransferRequest,
        previous: Transfer,
    ) -> TransferResult<TransferOutcome> {
        if !request.same_payload(previous.source, previous.destination, previous.amount) {
            return Err(TransferError::InvalidTransfer(format!(
                "requestId '{}' já foi usado para outra transferência",
                request.request_id
            )));
        }

        match previous.status {
            TransferStatus::Committed => {
                debug!("Replaying committed transfer");
                record_transfer_replayed();
                Ok(TransferOutcome {
                    transfer: previous,
                    replayed: true,
                })
            }
            TransferStatus::Pending => Err(TransferError::TransferInProgress(
                request.request_id.clone(),
            )),
            TransferStatus::Failed => Err(TransferError::FatalConsistency {
                request_id: previous.request_id,
                source_account: previous.source,
                destination_account: previous.destination,
                amount: previous.amount,
                reason: previous
                    .failure
                    .unwrap_or_else(|| "previous attempt failed".into()),
            }),
            status => Err(TransferError::Internal(format!(
                "ledger returned a reusable record ({}) as existing",
                status.as_str()
            ))),
        }
    }

    /// Locking and debiting, retried from the lookup on conflict.
    async fn apply(
        &self,
        request: &TransferRequest,
        cancelled: &mut oneshot::Receiver<()>,
    ) -> TransferResult<(Account, Account)> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let (source, destination) = self.lock(request).await?;

            if matches!(cancelled.try_recv(), Err(TryRecvError::Closed)) {
                return Err(TransferError::Cancelled);
            }

            debug!(attempt, version = source.version, "Debiting source");
            match self
                .call(self.store.conditional_update_balance(
                    source.id,
                    source.version,
                    -request.amount,
                ))
                .await
            {
                Ok(debited) => return self.credit(request, debited, destination, attempt).await,
                Err(e @ (StorageError::VersionConflict { .. } | StorageError::Timeout(_))) => {
                    debug!(attempt, error = %e, "Debit did not apply, retrying");
                    record_transfer_conflict("debit");
                    if attempt >= self.config.max_attempts {
                        return Err(TransferError::TransferAborted {
                            request_id: request.request_id.clone(),
                            attempts: attempt,
                            reason: format!("debit retries exhausted: {}", e),
                        });
                    }
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
                Err(StorageError::NotFound(id)) => return Err(TransferError::AccountNotFound(id)),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read both accounts in ascending id order and check the business rules.
    async fn lock(&self, request: &TransferRequest) -> TransferResult<(Account, Account)> {
        let (low, high) = if request.source < request.destination {
            (request.source, request.destination)
        } else {
            (request.destination, request.source)
        };
        let first = self.read(low).await?;
        let second = self.read(high).await?;
        let (source, destination) = if low == request.source {
            (first, second)
        } else {
            (second, first)
        };

        if !source.active {
            return Err(TransferError::AccountInactive(source.id));
        }
        if !destination.active {
            return Err(TransferError::AccountInactive(destination.id));
        }
        if source.balance < request.amount && !self.config.overdraft.allows(&source) {
            return Err(TransferError::InsufficientFunds {
                account: source.id,
                balance: source.balance,
                requested: request.amount,
            });
        }

        Ok((source, destination))
    }

    async fn read(&self, id: AccountId) -> TransferResult<Account> {
        match self.call(self.store.get(id)).await {
            Ok(account) => Ok(account),
            Err(StorageError::NotFound(id)) => Err(TransferError::AccountNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Credit the destination after a successful debit.
    ///
    /// Never returns a plain storage error: every failure goes through
    /// compensation.
    async fn credit(
        &self,
        request: &TransferRequest,
        debited: Account,
        mut destination: Account,
        attempts: u32,
    ) -> TransferResult<(Account, Account)> {
        let mut credit_attempt = 0;
        loop {
            credit_attempt += 1;
            debug!(attempt = credit_attempt, version = destination.version, "Crediting destination");

            let failure = match self
                .call(self.store.conditional_update_balance(
                    destination.id,
                    destination.version,
                    request.amount,
                ))
                .await
            {
                Ok(credited) => return Ok((debited, credited)),
                Err(StorageError::VersionConflict { .. }) => {
                    record_transfer_conflict("credit");
                    if credit_attempt >= self.config.max_attempts {
                        "credit retries exhausted".to_string()
                    } else {
                        tokio::time::sleep(self.backoff(credit_attempt)).await;
                        match self.call(self.store.get(destination.id)).await {
                            Ok(fresh) if fresh.active => {
                                destination = fresh;
                                continue;
                            }
                            Ok(_) => "destination account was deactivated".to_string(),
                            Err(StorageError::NotFound(_)) => {
                                "destination account vanished".to_string()
                            }
                            Err(e) => format!("destination re-read failed: {}", e),
                        }
                    }
                }
                Err(StorageError::NotFound(_)) => "destination account vanished".to_string(),
                Err(StorageError::Timeout(d)) => format!("credit timed out after {:?}", d),
                Err(e) => format!("credit failed: {}", e),
            };

            return Err(self.compensate(request, debited, attempts, failure).await);
        }
    }

    /// Restore the debited amount on the source.
    ///
    /// Returns `TransferAborted` when the source was restored and
    /// `FatalConsistency` otherwise.
    async fn compensate(
        &self,
        request: &TransferRequest,
        debited: Account,
        attempts: u32,
        reason: String,
    ) -> TransferError {
        warn!(reason = %reason, "Credit failed, compensating debit");

        let mut source = debited;
        let mut last_error = String::new();
        for attempt in 1..=self.config.compensation_attempts {
            match self
                .call(self.store.conditional_update_balance(
                    source.id,
                    source.version,
                    request.amount,
                ))
                .await
            {
                Ok(restored) => {
                    info!(balance = %restored.balance, "↩️  Debit compensated");
                    return TransferError::TransferAborted {
                        request_id: request.request_id.clone(),
                        attempts,
                        reason,
                    };
                }
                Err(e) => {
                    if matches!(e, StorageError::VersionConflict { .. }) {
                        record_transfer_conflict("compensation");
                    }
                    debug!(attempt, error = %e, "Compensation attempt failed");
                    last_error = e.to_string();
                }
            }

            if attempt < self.config.compensation_attempts {
                tokio::time::sleep(self.backoff(attempt)).await;
                match self.call(self.store.get(source.id)).await {
                    Ok(fresh) => source = fresh,
                    Err(e) => last_error = e.to_string(),
                }
            }
        }

        error!(
            request_id = %request.request_id,
            source = %request.source,
            destination = %request.destination,
            amount = %request.amount,
            reason = %reason,
            last_error = %last_error,
            "💥 Fatal consistency error: source debited and could not be restored"
        );
        record_fatal_consistency_error();

        TransferError::FatalConsistency {
            request_id: request.request_id.clone(),
            source_account: request.source,
            destination_account: request.destination,
            amount: request.amount,
            reason: format!("{}; compensation failed: {}", reason, last_error),
        }
    }

    /// Run a store call under the configured deadline.
    async fn call<T>(&self, fut: impl Future<Output = StorageResult<T>>) -> StorageResult<T> {
        match tokio::time::timeout(self.config.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(self.config.store_timeout)),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        self.config.retry_backoff.saturating_mul(1 << shift)
    }
}

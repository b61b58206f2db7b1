//! Domain models for accounts and transfers.
//!
//! These models are storage-agnostic and represent the canonical
//! form of banking data within the domain layer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::TransferError;

// =============================================================================
// Identifiers
// =============================================================================

/// Numeric account identifier, assigned by the store at provisioning.
///
/// Ordering is numeric; the transfer engine relies on it to read the two
/// accounts of a transfer in a deterministic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AccountId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Maximum length of an idempotency key.
pub const MAX_REQUEST_ID_LENGTH: usize = 128;

/// Caller-supplied idempotency key for a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequestId(String);

impl RequestId {
    /// Validate and wrap a request id.
    ///
    /// Accepts 1 to [`MAX_REQUEST_ID_LENGTH`] printable ASCII characters
    /// without whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, TransferError> {
        let value = value.into();
        if value.is_empty() {
            return Err(TransferError::InvalidTransfer(
                "requestId não pode ser vazio".into(),
            ));
        }
        if value.len() > MAX_REQUEST_ID_LENGTH {
            return Err(TransferError::InvalidTransfer(format!(
                "requestId longo demais: máximo de {} caracteres",
                MAX_REQUEST_ID_LENGTH
            )));
        }
        if !value.chars().all(|c| c.is_ascii_graphic()) {
            return Err(TransferError::InvalidTransfer(
                "requestId deve conter apenas caracteres ASCII imprimíveis".into(),
            ));
        }
        Ok(Self(value))
    }

    /// Generate a fresh random request id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RequestId {
    type Error = TransferError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RequestId> for String {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

// =============================================================================
// Accounts
// =============================================================================

/// Stored account record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Immutable identifier.
    pub id: AccountId,
    /// Display name of the holder.
    pub holder_name: String,
    /// Current balance.
    pub balance: Decimal,
    /// Inactive accounts reject transfers in both directions.
    pub active: bool,
    /// Whether this account may go below zero (only honoured when the
    /// engine runs with the per-account overdraft policy).
    pub allow_overdraft: bool,
    /// Optimistic concurrency token, incremented by every mutation.
    pub version: i64,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Account creation parameters (provisioning).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccount {
    pub holder_name: String,
    pub balance: Decimal,
    pub active: bool,
    pub allow_overdraft: bool,
}

impl NewAccount {
    /// Active account without overdraft.
    pub fn new(holder_name: impl Into<String>, balance: Decimal) -> Self {
        Self {
            holder_name: holder_name.into(),
            balance,
            active: true,
            allow_overdraft: false,
        }
    }
}

/// Initial version assigned to freshly provisioned accounts.
pub const INITIAL_VERSION: i64 = 1;

// =============================================================================
// Transfers
// =============================================================================

/// Lifecycle status of a transfer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Reserved; the pipeline is running.
    Pending,
    /// Both sides applied.
    Committed,
    /// Business-rule failure, nothing applied.
    Rejected,
    /// Retries exhausted, partial mutation compensated.
    Aborted,
    /// Compensation failed; operator intervention required.
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Committed => "committed",
            TransferStatus::Rejected => "rejected",
            TransferStatus::Aborted => "aborted",
            TransferStatus::Failed => "failed",
        }
    }

    /// Whether a new submission may take over a record in this status.
    pub fn is_reusable(&self) -> bool {
        matches!(self, TransferStatus::Rejected | TransferStatus::Aborted)
    }
}

impl std::str::FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransferStatus::Pending),
            "committed" => Ok(TransferStatus::Committed),
            "rejected" => Ok(TransferStatus::Rejected),
            "aborted" => Ok(TransferStatus::Aborted),
            "failed" => Ok(TransferStatus::Failed),
            other => Err(format!("unknown transfer status '{}'", other)),
        }
    }
}

/// A validated transfer submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub request_id: RequestId,
    pub source: AccountId,
    pub destination: AccountId,
    pub amount: Decimal,
}

/// Maximum number of decimal places accepted for an amount.
pub const MAX_AMOUNT_SCALE: u32 = 2;

impl TransferRequest {
    /// Check the input-shape rules: positive amount, at most
    /// [`MAX_AMOUNT_SCALE`] decimal places, distinct accounts.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.amount <= Decimal::ZERO {
            return Err(TransferError::InvalidTransfer(
                "o valor deve ser maior que zero".into(),
            ));
        }
        if self.amount.normalize().scale() > MAX_AMOUNT_SCALE {
            return Err(TransferError::InvalidTransfer(format!(
                "o valor não pode ter mais de {} casas decimais",
                MAX_AMOUNT_SCALE
            )));
        }
        if self.source == self.destination {
            return Err(TransferError::InvalidTransfer(
                "as contas de origem e destino devem ser diferentes".into(),
            ));
        }
        Ok(())
    }

    /// Whether another request carries the same payload.
    pub fn same_payload(&self, source: AccountId, destination: AccountId, amount: Decimal) -> bool {
        self.source == source && self.destination == destination && self.amount == amount
    }
}

/// Transfer audit record, as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub request_id: RequestId,
    pub source: AccountId,
    pub destination: AccountId,
    pub amount: Decimal,
    pub status: TransferStatus,
    /// Source balance right after the debit (committed records).
    pub source_balance: Option<Decimal>,
    /// Destination balance right after the credit (committed records).
    pub destination_balance: Option<Decimal>,
    /// Failure reason (non-committed records).
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transfer {
    /// Fresh pending record for a request.
    pub fn pending(request: &TransferRequest) -> Self {
        let now = Utc::now();
        Self {
            request_id: request.request_id.clone(),
            source: request.source,
            destination: request.destination,
            amount: request.amount,
            status: TransferStatus::Pending,
            source_balance: None,
            destination_balance: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark as committed with the post-transfer balances.
    pub fn committed(mut self, source_balance: Decimal, destination_balance: Decimal) -> Self {
        self.status = TransferStatus::Committed;
        self.source_balance = Some(source_balance);
        self.destination_balance = Some(destination_balance);
        self.failure = None;
        self.updated_at = Utc::now();
        self
    }

    /// Mark as finished without commit.
    pub fn finished(mut self, status: TransferStatus, failure: impl Into<String>) -> Self {
        self.status = status;
        self.failure = Some(failure.into());
        self.updated_at = Utc::now();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn request(amount: Decimal, source: i64, destination: i64) -> TransferRequest {
        TransferRequest {
            request_id: RequestId::new("req").unwrap(),
            source: AccountId(source),
            destination: AccountId(destination),
            amount,
        }
    }

    #[rstest]
    #[case::zero(dec!(0), 1, 2)]
    #[case::negative(dec!(-5), 1, 2)]
    #[case::too_precise(dec!(1.001), 1, 2)]
    #[case::same_account(dec!(10), 3, 3)]
    fn test_invalid_requests_are_rejected(
        #[case] amount: Decimal,
        #[case] source: i64,
        #[case] destination: i64,
    ) {
        let err = request(amount, source, destination).validate().unwrap_err();
        assert!(matches!(err, TransferError::InvalidTransfer(_)));
    }

    #[test]
    fn test_trailing_zeros_do_not_count_as_precision() {
        // 1.500 == 1.5, deux décimales significatives au maximum
        assert!(request(dec!(1.500), 1, 2).validate().is_ok());
        assert!(request(dec!(0.01), 1, 2).validate().is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("has space")]
    #[case("ação")]
    fn test_request_id_rejects_bad_values(#[case] value: &str) {
        assert!(RequestId::new(value).is_err());
    }

    #[test]
    fn test_request_id_length_limit() {
        assert!(RequestId::new("a".repeat(MAX_REQUEST_ID_LENGTH)).is_ok());
        assert!(RequestId::new("a".repeat(MAX_REQUEST_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_request_id_deserialization_validates() {
        let ok: Result<RequestId, _> = serde_json::from_str("\"abc-123\"");
        assert!(ok.is_ok());
        let bad: Result<RequestId, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_status_round_trips_through_storage_labels() {
        for status in [
            TransferStatus::Pending,
            TransferStatus::Committed,
            TransferStatus::Rejected,
            TransferStatus::Aborted,
            TransferStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TransferStatus>(), Ok(status));
        }
        assert!(TransferStatus::Rejected.is_reusable());
        assert!(!TransferStatus::Committed.is_reusable());
        assert!(!TransferStatus::Failed.is_reusable());
    }
}

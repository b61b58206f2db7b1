//! Metrics definitions for the banking service.
//!
//! This module defines all metrics used throughout the service layer.
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "transfers_committed_total",
        "Total number of transfers committed"
    );
    describe_counter!(
        "transfers_rejected_total",
        "Total number of transfers rejected by business rules"
    );
    describe_counter!(
        "transfers_aborted_total",
        "Total number of transfers aborted after exhausting retries"
    );
    describe_counter!(
        "transfer_conflicts_total",
        "Total number of optimistic concurrency conflicts during transfers"
    );
    describe_counter!(
        "transfer_replays_total",
        "Total number of transfers answered from the idempotency ledger"
    );
    describe_counter!(
        "fatal_consistency_errors_total",
        "Total number of failed compensations (operator intervention required)"
    );
    describe_histogram!(
        "transfer_duration_seconds",
        "Time taken to execute a transfer in seconds"
    );
    describe_counter!(
        "auth_failures_total",
        "Total number of rejected credentials"
    );
}

/// Record a committed transfer.
pub fn record_transfer_committed() {
    counter!("transfers_committed_total").increment(1);
}

/// Record a business-rule rejection.
///
/// # Arguments
/// * `reason` - Stable error code of the rejection
pub fn record_transfer_rejected(reason: &str) {
    counter!("transfers_rejected_total", "reason" => reason.to_string()).increment(1);
}

/// Record an aborted transfer.
pub fn record_transfer_aborted() {
    counter!("transfers_aborted_total").increment(1);
}

/// Record a version conflict.
///
/// # Arguments
/// * `step` - The protocol step that conflicted ("debit", "credit" or "compensation")
pub fn record_transfer_conflict(step: &'static str) {
    counter!("transfer_conflicts_total", "step" => step).increment(1);
}

/// Record a transfer answered from the ledger.
pub fn record_transfer_replayed() {
    counter!("transfer_replays_total").increment(1);
}

/// Record a fatal consistency error. Alerting hooks on this counter.
pub fn record_fatal_consistency_error() {
    counter!("fatal_consistency_errors_total").increment(1);
}

/// Record transfer duration.
pub fn record_transfer_duration(duration_secs: f64) {
    histogram!("transfer_duration_seconds").record(duration_secs);
}

/// Record a rejected credential.
///
/// # Arguments
/// * `reason` - Short failure label ("missing", "expired", ...)
pub fn record_auth_failure(reason: &'static str) {
    counter!("auth_failures_total", "reason" => reason).increment(1);
}

/// A timer that automatically records duration when dropped.
pub struct TransferTimer {
    start: Instant,
}

impl TransferTimer {
    /// Start a new transfer timer.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for TransferTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TransferTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_transfer_duration(duration);
    }
}

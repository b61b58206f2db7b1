//! Core domain layer for the Cofre banking API.
//!
//! This crate contains the domain models, port traits (interfaces), and
//! business logic services for account queries and money transfers. It
//! follows hexagonal architecture principles - this is the innermost layer
//! with no dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      cofre (binary)                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │        cofre-rest           │         cofre-graphql         │
//! │      (REST / axum)          │     (async-graphql / axum)    │
//! ├─────────────────────────────┴───────────────────────────────┤
//! │                      cofre-storage                          │
//! │               (in-memory / PostgreSQL)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      cofre-core  ← YOU ARE HERE             │
//! │           (models, ports, services, auth gate)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Domain models (Account, Transfer, RequestId, ...)
//! - [`ports`] - Interface traits for adapters to implement
//! - [`services`] - Business logic (TransferEngine, AccountQueryService)
//! - [`auth`] - Bearer token authentication gate
//! - [`error`] - Domain error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Key Concepts
//!
//! ## Ports
//!
//! - [`ports::AccountStore`] - Keyed account storage with a conditional
//!   (versioned) balance update as the only mutation primitive
//! - [`ports::TransferLedger`] - Transfer audit trail and idempotency registry
//!
//! ## Transfer protocol
//!
//! A transfer is committed as a debit of the source followed by a credit
//! of the destination, each conditional on the account version read just
//! before. Conflicts are retried with backoff; a credit that cannot be
//! applied triggers a compensating credit of the source. Request ids are
//! reserved in the ledger before any mutation so a resubmitted request is
//! never applied twice.

pub mod auth;
pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;

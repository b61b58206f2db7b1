//! Storage layer for the Cofre banking API.
//!
//! This crate provides the implementations of the [`AccountStore`] and
//! [`TransferLedger`] ports defined in `cofre-core`:
//!
//! - [`memory`] - `DashMap`-backed store and ledger, process lifetime only
//! - [`postgres`] - PostgreSQL store and ledger with embedded migrations
//!
//! [`AccountStore`]: cofre_core::ports::AccountStore
//! [`TransferLedger`]: cofre_core::ports::TransferLedger
//!
//! # Usage
//!
//! ```ignore
//! use cofre_storage::{Database, DatabaseConfig, PgAccountStore, PgTransferLedger};
//!
//! // Connect to the database
//! let config = DatabaseConfig::new(&database_url);
//! let db = Database::connect(&config).await?;
//!
//! // Run migrations
//! db.migrate().await?;
//!
//! let store = Arc::new(PgAccountStore::new(&db));
//! let ledger = Arc::new(PgTransferLedger::new(&db));
//! ```

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryAccountStore, InMemoryTransferLedger};
pub use postgres::{Database, DatabaseConfig, PgAccountStore, PgTransferLedger};

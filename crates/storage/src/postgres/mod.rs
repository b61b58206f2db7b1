//! PostgreSQL storage adapter.
//!
//! This module implements the port traits defined in `cofre-core`
//! using PostgreSQL as the backing store.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool and migrations
//! - [`PgAccountStore`] - `accounts` table, versioned conditional updates
//! - [`PgTransferLedger`] - `transfers` table, request id reservation
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::new(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let store = Arc::new(PgAccountStore::new(&db));
//! let ledger = Arc::new(PgTransferLedger::new(&db));
//! ```

mod account_repo;
mod database;
mod ledger_repo;
mod rows;

pub use account_repo::PgAccountStore;
pub use database::{Database, DatabaseConfig};
pub use ledger_repo::PgTransferLedger;

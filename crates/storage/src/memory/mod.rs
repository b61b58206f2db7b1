//! In-memory storage adapter.
//!
//! Backed by [`DashMap`](dashmap::DashMap): operations on different keys
//! proceed concurrently while operations on the same key are serialized
//! by the shard lock. Data lives for the lifetime of the process.

mod account_store;
mod ledger;

pub use account_store::InMemoryAccountStore;
pub use ledger::InMemoryTransferLedger;

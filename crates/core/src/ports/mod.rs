mod account_store;
mod ledger;

pub use account_store::*;
pub use ledger::*;

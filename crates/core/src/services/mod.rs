//! Core services - business logic for the banking domain.

mod accounts;
mod transfer;

pub use accounts::*;
pub use transfer::*;

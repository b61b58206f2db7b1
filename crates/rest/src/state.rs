//! Shared handler state.

use std::sync::Arc;

use cofre_core::auth::{Authenticator, UserDirectory};
use cofre_core::services::{AccountQueryService, TransferEngine};

/// State shared by every REST handler.
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountQueryService,
    pub transfers: TransferEngine,
    pub auth: Arc<Authenticator>,
    /// Credentials accepted by `POST /login`.
    pub users: Arc<UserDirectory>,
}

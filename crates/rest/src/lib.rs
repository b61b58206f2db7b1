//! REST API for the Cofre banking service.
//!
//! | Method | Path | |
//! |---|---|---|
//! | GET | `/health` | store reachability, public |
//! | POST | `/login` | exchange credentials for a bearer token, public |
//! | GET | `/contas` | list accounts |
//! | GET | `/contas/{id}` | one account |
//! | GET | `/contas/{id}/transferencias` | account transfer history |
//! | POST | `/transferencias` | execute a transfer |
//! | GET | `/transferencias/{requestId}` | look up a transfer |
//!
//! ```ignore
//! let state = AppState { accounts, transfers, auth, users };
//! cofre_rest::serve_with_shutdown(state, ServerConfig::default(), shutdown).await?;
//! ```

mod dto;
mod error;
mod handlers;
mod middleware;
mod server;
mod state;

pub use dto::{AccountResponse, LoginBody, LoginResponse, TransferBody, TransferResponse};
pub use error::{ApiError, ApiErrorResponse};
pub use handlers::IDEMPOTENCY_KEY_HEADER;
pub use server::{ServerConfig, router, serve_with_shutdown};
pub use state::AppState;

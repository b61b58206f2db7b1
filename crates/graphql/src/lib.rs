//! GraphQL API for the Cofre banking service.
//!
//! Exposes accounts and transfers over a single `/graphql` endpoint:
//!
//! ```graphql
//! type Query {
//!   contas: [Conta!]!
//!   conta(id: Int!): Conta
//!   transferencia(requestId: String!): Transferencia
//!   transferencias(contaId: Int!, limite: Int): [Transferencia!]!
//! }
//!
//! type Mutation {
//!   transferir(input: TransferenciaInput!): Transferencia!
//! }
//! ```
//!
//! Amounts are returned as `Float` and accepted as `Decimal` strings.
//! Errors carry the domain error code in `extensions.code`.

mod schema;
mod server;
mod types;

pub use schema::{MAX_QUERY_COMPLEXITY, MAX_QUERY_DEPTH, MutationRoot, QueryRoot, build_schema};
pub use server::{ServerConfig, router, serve_with_shutdown};
pub use types::{
    Caller, CofreSchema, Conta, QueryAccess, StatusTransferencia, Transferencia,
    TransferenciaInput,
};

//! GraphQL schema definition.
//!
//! Query and mutation roots over the account query service and the
//! transfer engine. Every error carries `extensions.code` with the stable
//! domain error code.

use async_graphql::{Context, EmptySubscription, ErrorExtensions, Object, Result, Schema};
use tracing::{debug, error};

use cofre_core::auth::Identity;
use cofre_core::error::{AccountError, AuthError, TransferError};
use cofre_core::models::{AccountId, RequestId, TransferRequest};
use cofre_core::services::{AccountQueryService, TransferEngine};

use crate::types::{Caller, CofreSchema, Conta, QueryAccess, Transferencia, TransferenciaInput};

// -----------------------------------------------------------------------------
// Schema Configuration
// -----------------------------------------------------------------------------

/// Maximum query depth to prevent deeply nested queries (DoS protection).
/// Note: GraphQL introspection requires depth ~13, so we use 15 to allow it.
pub const MAX_QUERY_DEPTH: usize = 15;

/// Maximum query complexity score (DoS protection).
/// Each field has a default complexity of 1, nested objects multiply.
pub const MAX_QUERY_COMPLEXITY: usize = 500;

// -----------------------------------------------------------------------------
// Schema Builder
// -----------------------------------------------------------------------------

/// Build the schema.
///
/// With `public_queries` set, queries run without a bearer token;
/// mutations always require one.
pub fn build_schema(
    accounts: AccountQueryService,
    transfers: TransferEngine,
    public_queries: bool,
) -> CofreSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(accounts)
        .data(transfers)
        .data(QueryAccess {
            public: public_queries,
        })
        .limit_depth(MAX_QUERY_DEPTH)
        .limit_complexity(MAX_QUERY_COMPLEXITY)
        .finish()
}

// -----------------------------------------------------------------------------
// Query
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// All accounts, ordered by id.
    async fn contas<'ctx>(&self, ctx: &Context<'ctx>) -> Result<Vec<Conta>> {
        authorize_query(ctx)?;
        let accounts = ctx.data::<AccountQueryService>()?;

        let views = accounts.list_accounts().await.map_err(account_error)?;
        Ok(views.into_iter().map(Conta::from).collect())
    }

    /// One account, `null` when it does not exist.
    async fn conta<'ctx>(&self, ctx: &Context<'ctx>, id: i64) -> Result<Option<Conta>> {
        authorize_query(ctx)?;
        let accounts = ctx.data::<AccountQueryService>()?;

        match accounts.get_account(AccountId(id)).await {
            Ok(view) => Ok(Some(view.into())),
            Err(AccountError::NotFound(_)) => Ok(None),
            Err(e) => Err(account_error(e)),
        }
    }

    /// A transfer by request id, `null` when unknown.
    async fn transferencia<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        request_id: String,
    ) -> Result<Option<Transferencia>> {
        authorize_query(ctx)?;
        let transfers = ctx.data::<TransferEngine>()?;

        let Ok(request_id) = RequestId::new(request_id) else {
            return Ok(None);
        };
        let transfer = transfers.find(&request_id).await.map_err(transfer_error)?;
        Ok(transfer.map(Transferencia::from))
    }

    /// Most recent transfers touching an account, newest first.
    async fn transferencias<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        conta_id: i64,
        limite: Option<u32>,
    ) -> Result<Vec<Transferencia>> {
        authorize_query(ctx)?;
        let accounts = ctx.data::<AccountQueryService>()?;

        let history = accounts
            .history(AccountId(conta_id), limite)
            .await
            .map_err(account_error)?;
        Ok(history.into_iter().map(Transferencia::from).collect())
    }
}

// -----------------------------------------------------------------------------
// Mutation
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Move `amount` from one account to another.
    async fn transferir<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        input: TransferenciaInput,
    ) -> Result<Transferencia> {
        let identity = identity(ctx)?;
        let transfers = ctx.data::<TransferEngine>()?;

        let request = TransferRequest {
            request_id: transfers
                .resolve_request_id(input.request_id)
                .map_err(transfer_error)?,
            source: AccountId(input.source_account_id),
            destination: AccountId(input.destination_account_id),
            amount: input.amount,
        };
        debug!(user = %identity.username, request_id = %request.request_id, "Transfer submitted");

        let outcome = transfers.execute(request).await.map_err(transfer_error)?;
        Ok(Transferencia::new(outcome.transfer, outcome.replayed))
    }
}

// -----------------------------------------------------------------------------
// Authorization
// -----------------------------------------------------------------------------

fn identity<'a>(ctx: &Context<'a>) -> Result<&'a Identity> {
    match ctx.data_opt::<Caller>() {
        Some(Caller(Ok(identity))) => Ok(identity),
        Some(Caller(Err(e))) => Err(auth_error(e)),
        None => Err(auth_error(&AuthError::MissingCredential)),
    }
}

fn authorize_query(ctx: &Context<'_>) -> Result<()> {
    if ctx.data_opt::<QueryAccess>().is_some_and(|access| access.public) {
        return Ok(());
    }
    identity(ctx).map(|_| ())
}

// -----------------------------------------------------------------------------
// Error mapping
// -----------------------------------------------------------------------------

fn coded(message: impl Into<String>, code: &'static str) -> async_graphql::Error {
    async_graphql::Error::new(message).extend_with(|_, e| e.set("code", code))
}

fn auth_error(err: &AuthError) -> async_graphql::Error {
    coded(err.public_message(), err.code())
}

fn account_error(err: AccountError) -> async_graphql::Error {
    if let AccountError::Storage(e) = &err {
        error!(error = %e, "Account query failed");
    }
    coded(err.public_message(), err.code())
}

fn transfer_error(err: TransferError) -> async_graphql::Error {
    if err.code() == "INTERNAL_ERROR" {
        error!(error = %err, "Transfer failed with internal error");
    }
    coded(err.public_message(), err.code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_graphql::Request;
    use cofre_core::models::NewAccount;
    use cofre_core::ports::AccountStore;
    use cofre_core::services::TransferConfig;
    use cofre_storage::{InMemoryAccountStore, InMemoryTransferLedger};
    use rust_decimal_macros::dec;
    use serde_json::json;

    async fn schema(public_queries: bool) -> (CofreSchema, Arc<InMemoryAccountStore>) {
        let store = Arc::new(InMemoryAccountStore::new());
        store
            .provision(NewAccount::new("Ana", dec!(100)))
            .await
            .unwrap();
        store
            .provision(NewAccount::new("Bruno", dec!(50)))
            .await
            .unwrap();
        let ledger = Arc::new(InMemoryTransferLedger::new());
        let config = TransferConfig {
            retry_backoff: Duration::from_millis(1),
            ..TransferConfig::default()
        };

        let schema = build_schema(
            AccountQueryService::new(store.clone(), ledger.clone()),
            TransferEngine::new(config, store.clone(), ledger),
            public_queries,
        );
        (schema, store)
    }

    fn authenticated(query: &str) -> Request {
        Request::new(query).data(Caller(Ok(Identity {
            id: 1,
            username: "test".into(),
        })))
    }

    fn anonymous(query: &str) -> Request {
        Request::new(query).data(Caller(Err(AuthError::MissingCredential)))
    }

    fn error_code(response: &async_graphql::Response) -> serde_json::Value {
        let errors = serde_json::to_value(&response.errors).unwrap();
        errors[0]["extensions"]["code"].clone()
    }

    const TRANSFER: &str = r#"
        mutation {
            transferir(input: {sourceAccountId: 1, destinationAccountId: 2, amount: "30", requestId: "t1"}) {
                status sourceBalance destinationBalance replayed
            }
        }
    "#;

    #[tokio::test]
    async fn test_contas_query() {
        let (schema, _) = schema(false).await;
        let response = schema
            .execute(authenticated("{ contas { id titular saldo ativa } }"))
            .await;

        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let data = response.data.into_json().unwrap();
        assert_eq!(data["contas"][0]["id"], 1);
        assert_eq!(data["contas"][0]["titular"], "Ana");
        assert_eq!(data["contas"][0]["saldo"].as_f64(), Some(100.0));
        assert_eq!(data["contas"][1]["saldo"].as_f64(), Some(50.0));
        assert_eq!(data["contas"][0]["ativa"], true);
    }

    // Test critique: les montants sont exposés en Float
    #[tokio::test]
    async fn test_amounts_are_float_fields() {
        let (schema, _) = schema(false).await;
        let response = schema
            .execute(authenticated(
                r#"{
                    conta: __type(name: "Conta") { fields { name type { ofType { name } } } }
                    transferencia: __type(name: "Transferencia") { fields { name type { name ofType { name } } } }
                }"#,
            ))
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let data = response.data.into_json().unwrap();

        let field = |object: &str, name: &str| {
            data[object]["fields"]
                .as_array()
                .unwrap()
                .iter()
                .find(|f| f["name"] == name)
                .unwrap()["type"]
                .clone()
        };
        assert_eq!(field("conta", "saldo")["ofType"]["name"], "Float");
        assert_eq!(field("transferencia", "amount")["ofType"]["name"], "Float");
        // Nullable: le type nommé est directement Float
        assert_eq!(field("transferencia", "sourceBalance")["name"], "Float");
        assert_eq!(field("transferencia", "destinationBalance")["name"], "Float");
    }

    #[tokio::test]
    async fn test_unknown_conta_is_null() {
        let (schema, _) = schema(false).await;
        let response = schema.execute(authenticated("{ conta(id: 99) { id } }")).await;

        assert!(response.errors.is_empty());
        assert_eq!(response.data.into_json().unwrap()["conta"], json!(null));
    }

    // Test critique: l'accès aux requêtes est protégé par défaut
    #[tokio::test]
    async fn test_queries_require_identity_unless_public() {
        let (private, _) = schema(false).await;
        let response = private.execute(anonymous("{ contas { id } }")).await;
        assert_eq!(error_code(&response), json!("UNAUTHENTICATED"));

        let (public, _) = schema(true).await;
        let response = public.execute(anonymous("{ contas { id } }")).await;
        assert!(response.errors.is_empty());
    }

    // Test critique: une mutation exige toujours une identité
    #[tokio::test]
    async fn test_mutation_always_requires_identity() {
        let (schema, store) = schema(true).await;
        let response = schema.execute(anonymous(TRANSFER)).await;

        assert_eq!(error_code(&response), json!("UNAUTHENTICATED"));
        assert_eq!(store.get(AccountId(1)).await.unwrap().balance, dec!(100));
    }

    #[tokio::test]
    async fn test_transfer_and_replay() {
        let (schema, store) = schema(false).await;

        let first = schema.execute(authenticated(TRANSFER)).await;
        assert!(first.errors.is_empty(), "{:?}", first.errors);
        let data = first.data.into_json().unwrap();
        assert_eq!(data["transferir"]["status"], "COMMITTED");
        assert_eq!(data["transferir"]["sourceBalance"].as_f64(), Some(70.0));
        assert_eq!(data["transferir"]["destinationBalance"].as_f64(), Some(80.0));
        assert_eq!(data["transferir"]["replayed"], false);

        let replay = schema.execute(authenticated(TRANSFER)).await;
        assert_eq!(
            replay.data.into_json().unwrap()["transferir"]["replayed"],
            true
        );
        assert_eq!(store.get(AccountId(1)).await.unwrap().balance, dec!(70));
        assert_eq!(store.get(AccountId(2)).await.unwrap().balance, dec!(80));

        let lookup = schema
            .execute(authenticated(r#"{ transferencia(requestId: "t1") { amount status } }"#))
            .await;
        assert_eq!(
            lookup.data.into_json().unwrap()["transferencia"]["status"],
            "COMMITTED"
        );

        let history = schema
            .execute(authenticated("{ transferencias(contaId: 1) { requestId } }"))
            .await;
        assert_eq!(
            history.data.into_json().unwrap()["transferencias"],
            json!([{"requestId": "t1"}])
        );
    }

    #[tokio::test]
    async fn test_transfer_errors_carry_codes() {
        let (schema, _) = schema(false).await;

        let insufficient = schema
            .execute(authenticated(
                r#"mutation { transferir(input: {sourceAccountId: 1, destinationAccountId: 2, amount: "100.01", requestId: "t2"}) { status } }"#,
            ))
            .await;
        assert_eq!(error_code(&insufficient), json!("INSUFFICIENT_FUNDS"));
        assert_eq!(insufficient.errors[0].message, "Saldo insuficiente");

        let missing_key = schema
            .execute(authenticated(
                r#"mutation { transferir(input: {sourceAccountId: 1, destinationAccountId: 2, amount: "1"}) { status } }"#,
            ))
            .await;
        assert_eq!(error_code(&missing_key), json!("INVALID_TRANSFER"));

        let unknown = schema
            .execute(authenticated("{ transferencias(contaId: 42) { requestId } }"))
            .await;
        assert_eq!(error_code(&unknown), json!("ACCOUNT_NOT_FOUND"));
    }
}

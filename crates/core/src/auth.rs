//! Authentication gate.
//!
//! Verifies the bearer credential presented with each request and
//! establishes the caller identity before any service call is made.
//! Tokens are HS256 JWTs signed with a shared secret and carrying
//! `{id, username, iat, exp}` claims.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::metrics::record_auth_failure;

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// Shared signing secret.
    pub secret: String,
    /// Lifetime of issued tokens.
    pub token_ttl: Duration,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"****")
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

impl AuthConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            token_ttl: DEFAULT_TOKEN_TTL,
        }
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub username: String,
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    id: i64,
    username: String,
    #[serde(default)]
    iat: i64,
    exp: i64,
}

/// Verifies and mints bearer tokens.
#[derive(Clone)]
pub struct Authenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    token_ttl: Duration,
}

impl Authenticator {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            token_ttl: config.token_ttl,
        }
    }

    /// Authenticate a raw `Authorization` header value.
    ///
    /// Fails for a missing credential, a header that is not
    /// `Bearer <token>`, a malformed token, a bad signature or an expired
    /// token.
    pub fn authenticate(&self, credential: Option<&str>) -> AuthResult<Identity> {
        let result = credential
            .ok_or(AuthError::MissingCredential)
            .and_then(bearer_token)
            .and_then(|token| self.verify(token));

        if let Err(e) = &result {
            debug!(reason = e.reason(), "Credential rejected");
            record_auth_failure(e.reason());
        }
        result
    }

    /// Verify a bare token (without the `Bearer` prefix).
    pub fn verify(&self, token: &str) -> AuthResult<Identity> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::Malformed(e.to_string()),
            }
        })?;

        Ok(Identity {
            id: data.claims.id,
            username: data.claims.username,
        })
    }

    /// Mint a token for `identity` valid for the configured lifetime.
    pub fn issue(&self, identity: &Identity) -> AuthResult<String> {
        let ttl = TimeDelta::from_std(self.token_ttl)
            .map_err(|e| AuthError::Issuing(e.to_string()))?;
        self.issue_with_ttl(identity, ttl)
    }

    /// Mint a token with an explicit lifetime (negative values produce an
    /// already expired token).
    pub fn issue_with_ttl(&self, identity: &Identity, ttl: TimeDelta) -> AuthResult<String> {
        let now = Utc::now();
        let claims = Claims {
            id: identity.id,
            username: identity.username.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Issuing(e.to_string()))
    }
}

// =============================================================================
// Users
// =============================================================================

/// A user allowed to log in, as configured in the users file.
#[derive(Clone, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    #[serde(alias = "senha")]
    pub password: String,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Users that may exchange credentials for a bearer token.
///
/// An empty directory rejects every login.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<String, UserRecord>,
}

impl UserDirectory {
    /// Index records by username. A repeated username keeps the last record.
    pub fn new(records: impl IntoIterator<Item = UserRecord>) -> Self {
        Self {
            users: records
                .into_iter()
                .map(|record| (record.username.clone(), record))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Check a username/password pair.
    ///
    /// Unknown users and wrong passwords fail the same way.
    pub fn login(&self, username: &str, password: &str) -> AuthResult<Identity> {
        let matched = self
            .users
            .get(username)
            .filter(|record| same_bytes(record.password.as_bytes(), password.as_bytes()));

        match matched {
            Some(record) => Ok(Identity {
                id: record.id,
                username: record.username.clone(),
            }),
            None => {
                let err = AuthError::InvalidCredentials;
                debug!(reason = err.reason(), "Login rejected");
                record_auth_failure(err.reason());
                Err(err)
            }
        }
    }
}

/// Byte comparison whose duration does not depend on where inputs differ.
fn same_bytes(expected: &[u8], given: &[u8]) -> bool {
    expected.len() == given.len()
        && expected
            .iter()
            .zip(given)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

/// Extract the token from a `Bearer <token>` header value.
fn bearer_token(header: &str) -> AuthResult<&str> {
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or_else(|| AuthError::Malformed("expected 'Bearer <token>'".into()))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::Malformed(format!(
            "unsupported authorization scheme '{}'",
            scheme
        )));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::Malformed("empty bearer token".into()));
    }
    Ok(token)
}

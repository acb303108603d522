//! # Identity Extraction
//!
//! Verifies the bearer token of a request and yields the tenant it belongs to.
//!
//! - The signature is checked against every cached issuer key in turn (a key whose
//!   `kid` matches the token header is tried first). A signature or algorithm mismatch
//!   moves on to the next key.
//! - Once a signature verifies, expiry, issuer and audience are enforced; a failure
//!   there is final.
//! - The tenant id comes from the `user_id` claim and the email from `email`. Both
//!   must be strings.

use std::collections::HashMap;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, decode_header, Validation};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::keyspace::{KeyError, TenantId};
use crate::observability::metrics;

mod keys;

pub use keys::{
    Jwk, Jwks, JwksFetcher, KeyFetchError, KeyFetcher, KeySnapshot, SigningKey, SigningKeyCache,
    StaticKeyFetcher,
};

pub const TENANT_CLAIM: &str = "user_id";
pub const EMAIL_CLAIM: &str = "email";

/// Every variant is an authorization failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingToken,

    #[error("authorization header is not a bearer token")]
    MalformedHeader,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token was not signed by any known signing key")]
    UnknownSigningKey,

    #[error("no signing keys available")]
    NoSigningKeys,

    #[error("token is missing string claim '{0}'")]
    MissingClaim(&'static str),

    #[error("token carries an unusable tenant id: {0}")]
    InvalidTenant(KeyError),
}

/// Tenant identity of one request. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantIdentity {
    pub tenant: TenantId,
    pub email: String,
}

/// Strip the `Bearer ` scheme from an `Authorization` header value.
pub fn extract_bearer_token(value: &str) -> Option<&str> {
    let value = value.trim();
    if let Some(rest) = value.strip_prefix("Bearer ") {
        Some(rest.trim())
    } else if let Some(rest) = value.strip_prefix("bearer ") {
        Some(rest.trim())
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct IdentityExtractor {
    keys: Arc<SigningKeyCache>,
    issuer: String,
    audience: String,
}

impl IdentityExtractor {
    pub fn new(
        keys: Arc<SigningKeyCache>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    pub fn key_cache(&self) -> &Arc<SigningKeyCache> {
        &self.keys
    }

    /// Verify the raw `Authorization` header value of a request.
    pub async fn verify_header(&self, header: Option<&str>) -> Result<TenantIdentity, AuthError> {
        let header = header.ok_or(AuthError::MissingToken)?;
        let token = extract_bearer_token(header)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MalformedHeader)?;
        self.verify(token).await
    }

    pub async fn verify(&self, token: &str) -> Result<TenantIdentity, AuthError> {
        let result = self.verify_token(token).await;
        match &result {
            Ok(identity) => {
                metrics::increment_token_verifications("success");
                debug!(tenant = %identity.tenant, "Bearer token verified");
            }
            Err(err) => {
                metrics::increment_token_verifications("failure");
                debug!(error = %err, "Bearer token rejected");
            }
        }
        result
    }

    async fn verify_token(&self, token: &str) -> Result<TenantIdentity, AuthError> {
        let header = decode_header(token).map_err(|err| AuthError::InvalidToken(err.to_string()))?;

        let snapshot = self.keys.current().await;
        if snapshot.is_empty() {
            return Err(AuthError::NoSigningKeys);
        }

        for key in snapshot.candidates(header.kid.as_deref()) {
            let mut validation = Validation::new(key.algorithm());
            validation.set_issuer(&[self.issuer.as_str()]);
            validation.set_audience(&[self.audience.as_str()]);
            validation.set_required_spec_claims(&["exp", "iss", "aud"]);

            match decode::<HashMap<String, Value>>(token, key.decoding_key(), &validation) {
                Ok(data) => return identity_from_claims(&data.claims),
                Err(err) if is_key_mismatch(err.kind()) => continue,
                Err(err) => return Err(AuthError::InvalidToken(err.to_string())),
            }
        }

        Err(AuthError::UnknownSigningKey)
    }
}

/// Errors that only say "not this key".
fn is_key_mismatch(kind: &JwtErrorKind) -> bool {
    matches!(
        kind,
        JwtErrorKind::InvalidSignature
            | JwtErrorKind::InvalidAlgorithm
            | JwtErrorKind::InvalidKeyFormat
            | JwtErrorKind::InvalidRsaKey(_)
            | JwtErrorKind::InvalidEcdsaKey
            | JwtErrorKind::Crypto(_)
    )
}

fn identity_from_claims(claims: &HashMap<String, Value>) -> Result<TenantIdentity, AuthError> {
    let string_claim = |name: &'static str| {
        claims
            .get(name)
            .and_then(Value::as_str)
            .ok_or(AuthError::MissingClaim(name))
    };

    let tenant = TenantId::parse(string_claim(TENANT_CLAIM)?).map_err(AuthError::InvalidTenant)?;
    let email = string_claim(EMAIL_CLAIM)?.to_string();
    Ok(TenantIdentity { tenant, email })
}

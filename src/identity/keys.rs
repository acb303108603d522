//! # Signing Keys
//!
//! Public keys of the token issuer and the cache that keeps them current.
//!
//! The cache holds one immutable [`KeySnapshot`] behind a lock. Readers clone the `Arc`
//! and release the lock immediately; a refresh builds a complete new snapshot and swaps it
//! in with a single assignment, so a reader never observes a half-updated key set.
//!
//! ```text
//! KeysFresh --(age >= refresh interval)--> KeysStale
//! KeysStale --(verify: fetch ok)---------> KeysFresh (new snapshot, new timestamp)
//! KeysStale --(verify: fetch failed)-----> KeysStale (previous keys still used)
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::constants::DEFAULT_KEY_FETCH_TIMEOUT_SECS;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum KeyFetchError {
    #[error("signing key request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("signing key document contains no usable keys")]
    NoUsableKeys,

    #[error("signing key fetch exceeded {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// One public key together with the algorithm it verifies.
#[derive(Clone)]
pub struct SigningKey {
    kid: Option<String>,
    algorithm: Algorithm,
    key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    pub fn new(kid: Option<String>, algorithm: Algorithm, key: DecodingKey) -> Self {
        Self {
            kid,
            algorithm,
            key,
        }
    }

    /// Build a key from one JWKS entry. Unsupported key types yield `None`.
    pub fn from_jwk(jwk: &Jwk) -> Option<Self> {
        match jwk.kty.as_str() {
            "RSA" => {
                let (n, e) = (jwk.n.as_deref()?, jwk.e.as_deref()?);
                let algorithm = jwk
                    .alg
                    .as_deref()
                    .and_then(|alg| Algorithm::from_str(alg).ok())
                    .filter(|alg| {
                        matches!(alg, Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512)
                    })
                    .unwrap_or(Algorithm::RS256);
                let key = DecodingKey::from_rsa_components(n, e).ok()?;
                Some(Self::new(jwk.kid.clone(), algorithm, key))
            }
            "OKP" if jwk.crv.as_deref() == Some("Ed25519") => {
                let key = DecodingKey::from_ed_components(jwk.x.as_deref()?).ok()?;
                Some(Self::new(jwk.kid.clone(), Algorithm::EdDSA, key))
            }
            other => {
                debug!(kty = other, kid = ?jwk.kid, "Skipping unsupported signing key type");
                None
            }
        }
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

/// JSON Web Key Set document as served by the issuer.
#[derive(Debug, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    pub crv: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
    pub x: Option<String>,
}

impl Jwks {
    pub fn signing_keys(&self) -> Vec<SigningKey> {
        self.keys.iter().filter_map(SigningKey::from_jwk).collect()
    }
}

/// Source of the issuer's current public keys.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Vec<SigningKey>, KeyFetchError>;
}

/// Fetches a JWKS document over HTTPS.
#[derive(Debug, Clone)]
pub struct JwksFetcher {
    url: String,
    client: reqwest::Client,
}

impl JwksFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, KeyFetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl KeyFetcher for JwksFetcher {
    async fn fetch(&self) -> Result<Vec<SigningKey>, KeyFetchError> {
        let jwks = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json::<Jwks>()
            .await?;

        let keys = jwks.signing_keys();
        if keys.is_empty() {
            return Err(KeyFetchError::NoUsableKeys);
        }
        Ok(keys)
    }
}

/// Fixed key set, for local development and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyFetcher {
    keys: Vec<SigningKey>,
}

impl StaticKeyFetcher {
    pub fn new(keys: Vec<SigningKey>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl KeyFetcher for StaticKeyFetcher {
    async fn fetch(&self) -> Result<Vec<SigningKey>, KeyFetchError> {
        if self.keys.is_empty() {
            return Err(KeyFetchError::NoUsableKeys);
        }
        Ok(self.keys.clone())
    }
}

/// Immutable set of keys plus the instant they were fetched.
#[derive(Debug, Default)]
pub struct KeySnapshot {
    keys: Vec<SigningKey>,
    fetched_at: Option<Instant>,
}

impl KeySnapshot {
    pub fn keys(&self) -> &[SigningKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Never-fetched snapshots are always stale.
    pub fn is_stale(&self, refresh_interval: Duration) -> bool {
        self.fetched_at
            .is_none_or(|at| at.elapsed() >= refresh_interval)
    }

    /// Keys in the order they should be tried: a key whose `kid` matches the token
    /// header first, then every other key.
    pub fn candidates<'a>(&'a self, kid: Option<&'a str>) -> impl Iterator<Item = &'a SigningKey> {
        let matching = self
            .keys
            .iter()
            .filter(move |key| kid.is_some() && key.kid() == kid);
        let rest = self
            .keys
            .iter()
            .filter(move |key| kid.is_none() || key.kid() != kid);
        matching.chain(rest)
    }
}

/// Shared signing-key cache, owned by the identity extractor.
pub struct SigningKeyCache {
    fetcher: Arc<dyn KeyFetcher>,
    refresh_interval: Duration,
    /// Upper bound on one refresh, so a hanging issuer cannot outlast the request
    fetch_timeout: Duration,
    snapshot: RwLock<Arc<KeySnapshot>>,
}

impl fmt::Debug for SigningKeyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyCache")
            .field("refresh_interval", &self.refresh_interval)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl SigningKeyCache {
    /// Create an empty cache. The first verification triggers the first fetch.
    pub fn new(fetcher: Arc<dyn KeyFetcher>, refresh_interval: Duration) -> Self {
        Self {
            fetcher,
            refresh_interval,
            fetch_timeout: Duration::from_secs(DEFAULT_KEY_FETCH_TIMEOUT_SECS),
            snapshot: RwLock::new(Arc::new(KeySnapshot::default())),
        }
    }

    /// Keep this below the request timeout, otherwise a stale-key fallback never gets to run.
    #[must_use]
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// The snapshot currently installed, without triggering a refresh.
    pub fn snapshot(&self) -> Arc<KeySnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Keys to verify with. Refreshes first when the installed snapshot is stale; a failed
    /// refresh leaves the previous keys in place.
    pub async fn current(&self) -> Arc<KeySnapshot> {
        let snapshot = self.snapshot();
        if !snapshot.is_stale(self.refresh_interval) {
            return snapshot;
        }

        match self.refresh().await {
            Ok(fresh) => fresh,
            Err(err) => {
                warn!(
                    error = %err,
                    cached_keys = snapshot.keys().len(),
                    "Signing key refresh failed, continuing with cached keys"
                );
                snapshot
            }
        }
    }

    /// Fetch the key set and install it. Concurrent refreshes are harmless: each one
    /// installs a complete snapshot.
    pub async fn refresh(&self) -> Result<Arc<KeySnapshot>, KeyFetchError> {
        let fetched = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch())
            .await
            .unwrap_or(Err(KeyFetchError::Timeout(self.fetch_timeout)));
        let keys = match fetched {
            Ok(keys) => keys,
            Err(err) => {
                metrics::increment_key_refresh("failure");
                return Err(err);
            }
        };

        let fresh = Arc::new(KeySnapshot {
            keys,
            fetched_at: Some(Instant::now()),
        });
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::clone(&fresh);

        metrics::increment_key_refresh("success");
        metrics::set_signing_keys_cached(fresh.keys().len());
        info!(keys = fresh.keys().len(), "Signing keys refreshed");
        Ok(fresh)
    }
}

//! Common test utilities
//!
//! Provides rustls initialization, token minting with throwaway Ed25519 keys, and
//! blob stores that inject failures and latency.

#![allow(dead_code, reason = "Each test binary uses a different subset of helpers")]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use credvault::blob::{BlobError, BlobStore, MemoryBlobStore};
use credvault::identity::{IdentityExtractor, SigningKey, SigningKeyCache, StaticKeyFetcher};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::{json, Value};

pub const ISSUER: &str = "https://securetoken.google.com/credvault-test";
pub const AUDIENCE: &str = "credvault-test";

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once across all tests.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Claims of a well-formed token for `user_id`.
pub fn claims_for(user_id: &str, email: &str) -> Value {
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": user_id,
        "user_id": user_id,
        "email": email,
        "iat": now_secs(),
        "exp": now_secs() + 3600,
    })
}

/// Token issuer holding a freshly generated Ed25519 key pair.
pub struct TestIssuer {
    kid: Option<String>,
    encoding_key: EncodingKey,
    public_x: String,
}

impl TestIssuer {
    pub fn new(kid: &str) -> Self {
        Self::build(Some(kid.to_string()))
    }

    /// Issuer whose tokens carry no `kid` header.
    pub fn anonymous() -> Self {
        Self::build(None)
    }

    fn build(kid: Option<String>) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
        Self {
            kid,
            encoding_key: EncodingKey::from_ed_der(pkcs8.as_ref()),
            public_x: URL_SAFE_NO_PAD.encode(pair.public_key().as_ref()),
        }
    }

    pub fn signing_key(&self) -> SigningKey {
        SigningKey::new(
            self.kid.clone(),
            Algorithm::EdDSA,
            DecodingKey::from_ed_components(&self.public_x).unwrap(),
        )
    }

    /// JWKS entry for this issuer's public key.
    pub fn jwk(&self) -> Value {
        json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "alg": "EdDSA",
            "kid": self.kid,
            "x": self.public_x,
        })
    }

    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = self.kid.clone();
        jsonwebtoken::encode(&header, claims, &self.encoding_key).unwrap()
    }

    pub fn token_for(&self, user_id: &str) -> String {
        self.sign(&claims_for(user_id, &format!("{user_id}@example.com")))
    }
}

/// Extractor trusting exactly the given issuers' keys.
pub fn extractor_for(issuers: &[&TestIssuer]) -> IdentityExtractor {
    let keys = issuers.iter().map(|issuer| issuer.signing_key()).collect();
    let cache = SigningKeyCache::new(
        Arc::new(StaticKeyFetcher::new(keys)),
        Duration::from_secs(3600),
    );
    IdentityExtractor::new(Arc::new(cache), ISSUER, AUDIENCE)
}

/// Memory-backed blob store with switchable faults.
#[derive(Clone, Default)]
pub struct FaultyBlobStore {
    pub inner: MemoryBlobStore,
    fail_puts: Arc<AtomicBool>,
    fail_lists: Arc<AtomicBool>,
    failing_gets: Arc<Mutex<HashSet<String>>>,
    phantom_keys: Arc<Mutex<Vec<String>>>,
    get_delay: Arc<Mutex<Option<Duration>>>,
}

impl FaultyBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    pub fn fail_get(&self, key: &str) {
        self.failing_gets.lock().unwrap().insert(key.to_string());
    }

    /// Listed but never readable, like an object deleted between listing and fetch.
    pub fn add_phantom_key(&self, key: &str) {
        self.phantom_keys.lock().unwrap().push(key.to_string());
    }

    pub fn delay_gets(&self, delay: Duration) {
        *self.get_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl BlobStore for FaultyBlobStore {
    fn name(&self) -> &str {
        "faulty-memory"
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), BlobError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(BlobError::Backend("injected put failure".into()));
        }
        self.inner.put(key, body).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let delay = *self.get_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_gets.lock().unwrap().contains(key) {
            return Err(BlobError::Backend("injected get failure".into()));
        }
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.inner.delete(key).await
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(BlobError::Backend("injected list failure".into()));
        }
        let mut keys = self.inner.list_by_prefix(prefix).await?;
        let phantoms = self.phantom_keys.lock().unwrap().clone();
        keys.extend(phantoms.into_iter().filter(|key| key.starts_with(prefix)));
        Ok(keys)
    }
}

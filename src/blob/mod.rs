//! # Blob Store
//!
//! Generic object-storage capability the credential store is built on.
//!
//! Implementations:
//! - [`S3BlobStore`] for AWS S3 and S3-compatible servers
//! - [`MemoryBlobStore`] for tests and local development
//!
//! Consistency is whatever the backing service provides; a single `put` is atomic.

use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod s3;

pub use memory::MemoryBlobStore;
pub use s3::{S3BlobStore, S3Settings};

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("object not found")]
    NotFound,

    #[error("object store error: {0}")]
    Backend(String),

    #[error("object body could not be decoded: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Object-storage operations used by the credential store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Human-readable backend name, used in logs and metrics
    fn name(&self) -> &str;

    /// Write (or overwrite) the object at `key`
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), BlobError>;

    /// Read the object at `key`, `BlobError::NotFound` when absent
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;

    /// Remove the object at `key`. Removing an absent object succeeds.
    async fn delete(&self, key: &str) -> Result<(), BlobError>;

    /// Every key starting with `prefix`. An empty result is not an error.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>, BlobError>;
}

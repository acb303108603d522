//! # Credvault
//!
//! Multi-tenant credential store. Each authenticated user stores, lists, updates and
//! deletes credential records, persisted as individual JSON objects in a shared
//! object-storage bucket and namespaced by the tenant id carried in the user's
//! bearer token.
//!
//! ## Layers
//!
//! - [`identity`] - bearer token verification against the issuer's rotating keys
//! - [`keyspace`] - tenant and credential ids to object keys
//! - [`store`] - credential operations on a [`blob::BlobStore`]
//! - [`server`] - HTTP surface, metrics and probes

pub mod blob;
pub mod config;
pub mod constants;
pub mod error;
pub mod identity;
pub mod keyspace;
pub mod model;
pub mod observability;
pub mod server;
pub mod store;

pub use error::{ErrorKind, StoreError, StoreResult};
pub use keyspace::TenantId;
pub use model::{Credential, CredentialDraft, CredentialField};
pub use store::{CredentialStore, StoreSettings};

//! # Credential Store
//!
//! Credential operations on top of a [`BlobStore`], addressed through the key space.
//!
//! - Every operation takes the tenant supplied by identity extraction; nothing here reads a
//!   tenant from caller payloads.
//! - `update_field` is read-modify-write without a version check. Concurrent updates of the
//!   same record race and the last completed write wins.
//! - `list` fans out one fetch per record key, bounded in concurrency, and the whole read
//!   runs under a deadline. Cost is O(n) fetches per tenant.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::blob::{BlobError, BlobStore};
use crate::constants::{DEFAULT_LIST_FETCH_CONCURRENCY, DEFAULT_LIST_TIMEOUT_MS};
use crate::error::{StoreError, StoreResult};
use crate::keyspace::{self, TenantId};
use crate::model::{Credential, CredentialDraft, CredentialField};
use crate::observability::metrics;

/// Tuning of aggregate reads.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Deadline for one `list`, listing plus every object fetch
    pub list_timeout: Duration,
    /// Maximum object fetches in flight during one `list`
    pub fetch_concurrency: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            list_timeout: Duration::from_millis(DEFAULT_LIST_TIMEOUT_MS),
            fetch_concurrency: DEFAULT_LIST_FETCH_CONCURRENCY,
        }
    }
}

#[derive(Clone)]
pub struct CredentialStore {
    blobs: Arc<dyn BlobStore>,
    settings: StoreSettings,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("backend", &self.blobs.name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl CredentialStore {
    pub fn new(blobs: Arc<dyn BlobStore>, settings: StoreSettings) -> Self {
        Self { blobs, settings }
    }

    pub fn backend(&self) -> &str {
        self.blobs.name()
    }

    /// Assign a fresh id and timestamps, then write the record.
    pub async fn create(
        &self,
        tenant: &TenantId,
        draft: CredentialDraft,
    ) -> StoreResult<Credential> {
        let span = info_span!("credential.create", tenant = %tenant);
        timed("create", self.insert_record(tenant, draft))
            .instrument(span)
            .await
    }

    /// Records of other tenants are indistinguishable from absent ones.
    pub async fn get(&self, tenant: &TenantId, credential_id: Uuid) -> StoreResult<Credential> {
        let span = info_span!("credential.get", tenant = %tenant, credential_id = %credential_id);
        timed("get", self.read_record(tenant, credential_id))
            .instrument(span)
            .await
    }

    /// Every record of the tenant, oldest first. No records is an empty result.
    pub async fn list(&self, tenant: &TenantId) -> StoreResult<Vec<Credential>> {
        let span = info_span!("credential.list", tenant = %tenant);
        timed("list", self.read_aggregate_with_deadline(tenant))
            .instrument(span)
            .await
    }

    /// Change one field. The value is validated before the record is read.
    pub async fn update_field(
        &self,
        tenant: &TenantId,
        credential_id: Uuid,
        field: CredentialField,
        value: String,
    ) -> StoreResult<Credential> {
        let span = info_span!(
            "credential.update_field",
            tenant = %tenant,
            credential_id = %credential_id,
            field = field.as_str()
        );
        timed(
            "update_field",
            self.rewrite_field(tenant, credential_id, field, value),
        )
        .instrument(span)
        .await
    }

    /// Remove one record. Removing an absent record succeeds.
    pub async fn delete(&self, tenant: &TenantId, credential_id: Uuid) -> StoreResult<()> {
        let span = info_span!("credential.delete", tenant = %tenant, credential_id = %credential_id);
        timed("delete", self.remove_record(tenant, credential_id))
            .instrument(span)
            .await
    }

    /// Remove every record of the tenant and return how many keys were removed.
    pub async fn purge(&self, tenant: &TenantId) -> StoreResult<usize> {
        let span = info_span!("credential.purge", tenant = %tenant);
        timed("purge", self.remove_aggregate(tenant))
            .instrument(span)
            .await
    }

    async fn insert_record(
        &self,
        tenant: &TenantId,
        draft: CredentialDraft,
    ) -> StoreResult<Credential> {
        draft.validate()?;
        let credential = Credential::from_draft(draft, Utc::now());
        let key = keyspace::record_key(tenant, credential.id);
        self.write_record(&key, &credential).await?;
        info!(credential_id = %credential.id, service = %credential.service, "Created credential");
        Ok(credential)
    }

    async fn rewrite_field(
        &self,
        tenant: &TenantId,
        credential_id: Uuid,
        field: CredentialField,
        value: String,
    ) -> StoreResult<Credential> {
        field.validate(&value)?;

        let mut credential = self.read_record(tenant, credential_id).await?;
        field.apply(&mut credential, value);
        credential.touch(Utc::now());

        let key = keyspace::record_key(tenant, credential_id);
        self.write_record(&key, &credential).await?;
        info!("Updated credential field");
        Ok(credential)
    }

    async fn remove_record(&self, tenant: &TenantId, credential_id: Uuid) -> StoreResult<()> {
        let key = keyspace::record_key(tenant, credential_id);
        self.blobs
            .delete(&key)
            .await
            .map_err(|err| StoreError::storage(&key, err))?;
        info!("Deleted credential");
        Ok(())
    }

    async fn remove_aggregate(&self, tenant: &TenantId) -> StoreResult<usize> {
        let prefix = keyspace::listing_prefix(tenant);
        let keys = self
            .blobs
            .list_by_prefix(&prefix)
            .await
            .map_err(|err| StoreError::aggregate(&prefix, err))?;
        let count = keys.len();

        stream::iter(keys)
            .map(|key| async move {
                self.blobs
                    .delete(&key)
                    .await
                    .map_err(|err| StoreError::storage(&key, err))
            })
            .buffer_unordered(self.settings.fetch_concurrency.max(1))
            .try_collect::<Vec<()>>()
            .await?;

        info!(count, "Purged tenant credentials");
        Ok(count)
    }

    async fn read_record(&self, tenant: &TenantId, credential_id: Uuid) -> StoreResult<Credential> {
        let key = keyspace::record_key(tenant, credential_id);
        let body = self.blobs.get(&key).await.map_err(|err| match err {
            BlobError::NotFound => StoreError::NotFound { credential_id },
            other => StoreError::storage(&key, other),
        })?;
        serde_json::from_slice(&body).map_err(|err| StoreError::storage(&key, err.into()))
    }

    async fn write_record(&self, key: &str, credential: &Credential) -> StoreResult<()> {
        let body = serde_json::to_vec(credential).map_err(|err| StoreError::storage(key, err.into()))?;
        self.blobs
            .put(key, body)
            .await
            .map_err(|err| StoreError::storage(key, err))
    }

    async fn read_aggregate_with_deadline(&self, tenant: &TenantId) -> StoreResult<Vec<Credential>> {
        let prefix = keyspace::listing_prefix(tenant);
        let deadline = self.settings.list_timeout;
        match tokio::time::timeout(deadline, self.read_aggregate(tenant, &prefix)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(object_prefix = %prefix, deadline_ms = deadline.as_millis(), "Aggregate read timed out");
                Err(StoreError::Timeout { prefix, deadline })
            }
        }
    }

    async fn read_aggregate(&self, tenant: &TenantId, prefix: &str) -> StoreResult<Vec<Credential>> {
        let keys = self
            .blobs
            .list_by_prefix(prefix)
            .await
            .map_err(|err| StoreError::aggregate(prefix, err))?;

        let record_keys: Vec<String> = keys
            .into_iter()
            .filter(|key| match keyspace::credential_id_from_key(tenant, key) {
                Ok(_) => true,
                Err(err) => {
                    warn!(object_key = %key, error = %err, "Ignoring object outside the record layout");
                    false
                }
            })
            .collect();
        debug!(object_prefix = prefix, count = record_keys.len(), "Fetching aggregate members");

        let fetched: Vec<Option<Credential>> = stream::iter(record_keys)
            .map(|key| self.read_aggregate_member(prefix, key))
            .buffer_unordered(self.settings.fetch_concurrency.max(1))
            .try_collect()
            .await?;

        let mut credentials: Vec<Credential> = fetched.into_iter().flatten().collect();
        credentials.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(credentials)
    }

    /// `None` when the record vanished between listing and fetch (deleted concurrently).
    async fn read_aggregate_member(&self, prefix: &str, key: String) -> StoreResult<Option<Credential>> {
        let body = match self.blobs.get(&key).await {
            Ok(body) => body,
            Err(BlobError::NotFound) => {
                debug!(object_key = %key, "Record disappeared during aggregate read");
                return Ok(None);
            }
            Err(err) => return Err(StoreError::aggregate(prefix, err)),
        };
        let credential =
            serde_json::from_slice(&body).map_err(|err| StoreError::aggregate(prefix, err.into()))?;
        Ok(Some(credential))
    }
}

/// Run one store operation and record its outcome and duration.
async fn timed<T, F>(operation: &'static str, operation_future: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    let start = Instant::now();
    let result = operation_future.await;
    let outcome = match &result {
        Ok(_) => "ok",
        Err(err) => {
            debug!(operation, error = %err, "Credential operation failed");
            err.kind().as_str()
        }
    };
    metrics::record_credential_operation(operation, outcome, start.elapsed().as_secs_f64());
    result
}

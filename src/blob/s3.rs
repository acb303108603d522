//! # S3 Blob Store
//!
//! Object storage on AWS S3 (or any S3-compatible server such as a local mock
//! listening on `http://localhost:5002`).
//!
//! - Writes request server-side encryption (AES256)
//! - Listing follows continuation tokens so results are never truncated
//! - Deleting an absent key succeeds (S3 semantics)

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ServerSideEncryption;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info, warn};

use super::{BlobError, BlobStore};

/// Connection settings for [`S3BlobStore`]
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint (S3-compatible server); `None` uses the regional AWS endpoint
    pub endpoint: Option<String>,
    /// Path-style addressing, required by most local S3 servers
    pub force_path_style: bool,
}

#[derive(Debug, Clone)]
pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
}

impl S3BlobStore {
    /// Create a client using the default AWS credential chain
    pub async fn connect(settings: &S3Settings) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(settings.region.clone()))
            .load()
            .await;

        Self::from_sdk_config(&sdk_config, settings)
    }

    pub fn from_sdk_config(sdk_config: &SdkConfig, settings: &S3Settings) -> Self {
        let mut builder =
            aws_sdk_s3::config::Builder::from(sdk_config).force_path_style(settings.force_path_style);
        if let Some(endpoint) = &settings.endpoint {
            info!(
                endpoint = endpoint.as_str(),
                bucket = settings.bucket.as_str(),
                "Using custom S3 endpoint"
            );
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: S3Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn backend_error<E>(operation: &str, key: &str, err: E) -> BlobError
where
    E: std::error::Error,
{
    let message = format!("{operation} {key}: {}", DisplayErrorContext(&err));
    warn!(operation, object_key = key, error = %message, "S3 operation failed");
    BlobError::Backend(message)
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn name(&self) -> &str {
        "s3"
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), BlobError> {
        debug!(bucket = self.bucket.as_str(), object_key = key, "s3 put");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/json")
            .server_side_encryption(ServerSideEncryption::Aes256)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| backend_error("PutObject", key, err))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        debug!(bucket = self.bucket.as_str(), object_key = key, "s3 get");
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(aws_sdk_s3::operation::get_object::GetObjectError::is_no_such_key)
                {
                    return Err(BlobError::NotFound);
                }
                return Err(backend_error("GetObject", key, err));
            }
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|err| backend_error("GetObject body", key, err))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        debug!(bucket = self.bucket.as_str(), object_key = key, "s3 delete");
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| backend_error("DeleteObject", key, err))?;
        Ok(())
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        debug!(bucket = self.bucket.as_str(), object_prefix = prefix, "s3 list");
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|err| backend_error("ListObjectsV2", prefix, err))?;

            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(object_prefix = prefix, count = keys.len(), "s3 list complete");
        Ok(keys)
    }
}

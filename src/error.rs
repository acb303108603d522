//! # Errors
//!
//! Failure taxonomy of the credential store. Every failure is recovered at the request
//! boundary and mapped to a response; nothing in the core retries.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::blob::BlobError;
use crate::identity::AuthError;
use crate::model::ValidationError;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed or missing input, detected before any storage access
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Referenced record is absent for this tenant (includes records owned by other tenants)
    #[error("credential {credential_id} not found")]
    NotFound { credential_id: Uuid },

    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    /// A single blob-store operation failed, or a stored object could not be decoded
    #[error("storage failure on {key}: {source}")]
    Storage {
        key: String,
        #[source]
        source: BlobError,
    },

    /// The listing step of an aggregate read failed, or one of its object fetches did
    #[error("aggregate read failed for {prefix}: {source}")]
    AggregateRead {
        prefix: String,
        #[source]
        source: BlobError,
    },

    #[error("aggregate read for {prefix} exceeded {}ms", .deadline.as_millis())]
    Timeout { prefix: String, deadline: Duration },
}

/// Coarse classification of a [`StoreError`], stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ValidationFailure,
    NotFound,
    Unauthorized,
    StorageFailure,
    AggregateReadFailure,
    Timeout,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ValidationFailure => "validation_failure",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::StorageFailure => "storage_failure",
            ErrorKind::AggregateReadFailure => "aggregate_read_failure",
            ErrorKind::Timeout => "timeout",
        }
    }
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Validation(_) => ErrorKind::ValidationFailure,
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Unauthorized(_) => ErrorKind::Unauthorized,
            StoreError::Storage { .. } => ErrorKind::StorageFailure,
            StoreError::AggregateRead { .. } => ErrorKind::AggregateReadFailure,
            StoreError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Whether a caller may repeat the same operation and expect a different outcome.
    ///
    /// Only storage-side failures are transient. Retrying `create` after a transient
    /// failure may produce a second record with a new id.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::StorageFailure | ErrorKind::AggregateReadFailure | ErrorKind::Timeout
        )
    }

    pub(crate) fn storage(key: impl Into<String>, source: BlobError) -> Self {
        StoreError::Storage {
            key: key.into(),
            source,
        }
    }

    pub(crate) fn aggregate(prefix: impl Into<String>, source: BlobError) -> Self {
        StoreError::AggregateRead {
            prefix: prefix.into(),
            source,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_retryability() {
        let not_found = StoreError::NotFound {
            credential_id: Uuid::new_v4(),
        };
        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert!(!not_found.is_retryable());

        let validation = StoreError::from(ValidationError::Required("service"));
        assert_eq!(validation.kind(), ErrorKind::ValidationFailure);
        assert!(!validation.is_retryable());

        let storage = StoreError::storage("users/a/b", BlobError::Backend("boom".into()));
        assert_eq!(storage.kind(), ErrorKind::StorageFailure);
        assert!(storage.is_retryable());

        let timeout = StoreError::Timeout {
            prefix: "users/a/".into(),
            deadline: Duration::from_millis(5000),
        };
        assert!(timeout.is_retryable());
        assert_eq!(
            timeout.to_string(),
            "aggregate read for users/a/ exceeded 5000ms"
        );
    }
}

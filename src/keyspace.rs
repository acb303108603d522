//! # Key Space
//!
//! Maps tenants and credential ids onto object-storage keys.
//!
//! ```text
//! users/<tenantId>                  aggregate key (all records of a tenant)
//! users/<tenantId>/<credentialId>   record key
//! ```
//!
//! Tenant ids never contain the separator, and listings always use the aggregate key
//! followed by the separator, so the listing of one tenant can never match a record key
//! of another tenant (`users/ab/` is not a prefix of `users/abc/...`).

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::constants::{KEYSPACE_ROOT, KEY_SEPARATOR};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("tenant id is empty")]
    EmptyTenant,

    #[error("tenant id contains reserved character '{0}'")]
    ReservedCharacter(char),

    #[error("object key '{0}' is outside the tenant key space")]
    ForeignKey(String),

    #[error("object key '{0}' does not end in a credential id")]
    MalformedRecordKey(String),
}

/// Identifier of a tenant, as extracted from a verified bearer token.
///
/// Only constructible through [`TenantId::parse`], which enforces the key-space rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantId(String);

impl TenantId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, KeyError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(KeyError::EmptyTenant);
        }
        if raw.contains(KEY_SEPARATOR) {
            return Err(KeyError::ReservedCharacter(KEY_SEPARATOR));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key under which all of a tenant's records live.
pub fn aggregate_key(tenant: &TenantId) -> String {
    format!("{KEYSPACE_ROOT}{KEY_SEPARATOR}{tenant}")
}

/// Prefix handed to the blob store when listing a tenant's aggregate.
pub fn listing_prefix(tenant: &TenantId) -> String {
    format!("{}{KEY_SEPARATOR}", aggregate_key(tenant))
}

/// Address of a single record.
pub fn record_key(tenant: &TenantId, credential_id: Uuid) -> String {
    format!("{}{credential_id}", listing_prefix(tenant))
}

/// Recover the credential id from a record key belonging to `tenant`.
pub fn credential_id_from_key(tenant: &TenantId, key: &str) -> Result<Uuid, KeyError> {
    let prefix = listing_prefix(tenant);
    let rest = key
        .strip_prefix(prefix.as_str())
        .ok_or_else(|| KeyError::ForeignKey(key.to_string()))?;
    Uuid::parse_str(rest).map_err(|_| KeyError::MalformedRecordKey(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(raw: &str) -> TenantId {
        TenantId::parse(raw).unwrap()
    }

    #[test]
    fn test_aggregate_and_record_keys() {
        let t = tenant("uid-123");
        let id = Uuid::parse_str("0b6d2c1e-52a4-4c55-9a61-3bfa2e4d8a11").unwrap();

        assert_eq!(aggregate_key(&t), "users/uid-123");
        assert_eq!(
            record_key(&t, id),
            "users/uid-123/0b6d2c1e-52a4-4c55-9a61-3bfa2e4d8a11"
        );
        assert!(record_key(&t, id).starts_with(&format!("{}/", aggregate_key(&t))));
    }

    #[test]
    fn test_tenant_listing_prefix_does_not_match_longer_tenant() {
        let short = tenant("ab");
        let long = tenant("abc");
        let key = record_key(&long, Uuid::new_v4());

        assert!(!key.starts_with(&listing_prefix(&short)));
        assert!(key.starts_with(&listing_prefix(&long)));
    }

    #[test]
    fn test_tenant_id_rejects_empty_and_separator() {
        assert_eq!(TenantId::parse(""), Err(KeyError::EmptyTenant));
        assert_eq!(TenantId::parse("   "), Err(KeyError::EmptyTenant));
        assert_eq!(
            TenantId::parse("a/b"),
            Err(KeyError::ReservedCharacter('/'))
        );
    }

    #[test]
    fn test_credential_id_from_key() {
        let t = tenant("alice");
        let id = Uuid::new_v4();

        assert_eq!(credential_id_from_key(&t, &record_key(&t, id)), Ok(id));
        assert!(matches!(
            credential_id_from_key(&tenant("bob"), &record_key(&t, id)),
            Err(KeyError::ForeignKey(_))
        ));
        assert!(matches!(
            credential_id_from_key(&t, "users/alice/not-a-uuid"),
            Err(KeyError::MalformedRecordKey(_))
        ));
    }
}

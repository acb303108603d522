//! # Credential Model
//!
//! The record stored per credential, the draft accepted on creation, and the
//! enumerated set of fields that may be updated in place.
//!
//! Records are persisted as JSON with camelCase field names. Objects written by the
//! earlier service generation (`Uid`, `Description`, `Metadata`, `CreatedAt`,
//! `UpdatedAt`, RFC 1123 timestamps) are still readable.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::constants::{SERVICE_NAME_MAX_LEN, SERVICE_NAME_MIN_LEN};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("{field} must be between {min} and {max} characters, got {actual}")]
    Length {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("unknown credential field '{0}', expected one of: username, password, service")]
    UnknownField(String),

    #[error("invalid credential id '{0}'")]
    InvalidCredentialId(String),
}

/// One stored secret record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(alias = "Uid")]
    pub id: Uuid,
    pub service: String,
    pub username: String,
    pub password: String,
    #[serde(default, alias = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "Metadata", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(with = "timestamp", alias = "CreatedAt")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp", alias = "UpdatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("description", &self.description)
            .field("metadata", &self.metadata)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl Credential {
    /// Build a fresh record from a validated draft: new id, both timestamps set to `now`.
    pub fn from_draft(draft: CredentialDraft, now: DateTime<Utc>) -> Self {
        let now = now.trunc_subsecs(6);
        Self {
            id: Uuid::new_v4(),
            service: draft.service,
            username: draft.username,
            password: draft.password,
            description: draft.description,
            metadata: draft.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance `updated_at`, strictly later than its previous value.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let floor = self.updated_at + Duration::microseconds(1);
        self.updated_at = now.trunc_subsecs(6).max(floor);
    }
}

/// Payload accepted when creating a credential. Server-assigned fields are not part of it.
#[derive(Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDraft {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl fmt::Debug for CredentialDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialDraft")
            .field("service", &self.service)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("description", &self.description)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl CredentialDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        CredentialField::Service.validate(&self.service)?;
        CredentialField::Username.validate(&self.username)?;
        CredentialField::Password.validate(&self.password)?;
        Ok(())
    }
}

/// Fields that can be changed on an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialField {
    Username,
    Password,
    Service,
}

impl CredentialField {
    pub const ALL: [CredentialField; 3] = [
        CredentialField::Username,
        CredentialField::Password,
        CredentialField::Service,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CredentialField::Username => "username",
            CredentialField::Password => "password",
            CredentialField::Service => "service",
        }
    }

    /// Check a candidate value. Runs before any storage access.
    pub fn validate(self, value: &str) -> Result<(), ValidationError> {
        if value.is_empty() {
            return Err(ValidationError::Required(self.as_str()));
        }
        if self == CredentialField::Service {
            let actual = value.chars().count();
            if !(SERVICE_NAME_MIN_LEN..=SERVICE_NAME_MAX_LEN).contains(&actual) {
                return Err(ValidationError::Length {
                    field: self.as_str(),
                    min: SERVICE_NAME_MIN_LEN,
                    max: SERVICE_NAME_MAX_LEN,
                    actual,
                });
            }
        }
        Ok(())
    }

    pub fn apply(self, credential: &mut Credential, value: String) {
        match self {
            CredentialField::Username => credential.username = value,
            CredentialField::Password => credential.password = value,
            CredentialField::Service => credential.service = value,
        }
    }
}

impl FromStr for CredentialField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownField(s.to_string()))
    }
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a credential id taken from a request path.
pub fn parse_credential_id(raw: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(raw).map_err(|_| ValidationError::InvalidCredentialId(raw.to_string()))
}

pub(crate) mod timestamp {
    //! Fixed textual timestamp format, microsecond precision, always UTC.

    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

    /// RFC 1123 without the zone
    const LEGACY_FORMAT: &str = "%a, %d %b %Y %H:%M:%S";

    pub fn format(value: &DateTime<Utc>) -> String {
        value.format(FORMAT).to_string()
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, FORMAT) {
            return Some(naive.and_utc());
        }
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        // RFC 1123 as written by the previous service generation, which used "UTC" as zone name
        let legacy = raw.strip_suffix(" UTC").map_or_else(
            || raw.to_string(),
            |head| format!("{head} GMT"),
        );
        if let Ok(parsed) = DateTime::parse_from_rfc2822(&legacy) {
            return Some(parsed.with_timezone(&Utc));
        }
        parse_unknown_zone(raw)
    }

    /// RFC 1123 with a zone abbreviation the RFC 2822 parser does not know (`CET`, `IST`...).
    /// The abbreviation carries no offset, so the wall-clock time is read as UTC.
    fn parse_unknown_zone(raw: &str) -> Option<DateTime<Utc>> {
        let (head, zone) = raw.rsplit_once(' ')?;
        let is_abbreviation = (3..=5).contains(&zone.len())
            && zone.chars().all(|c| c.is_ascii_uppercase());
        if !is_abbreviation {
            return None;
        }
        NaiveDateTime::parse_from_str(head, LEGACY_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
    }
}

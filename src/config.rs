//! # Service Configuration
//!
//! Settings loaded from environment variables. Every setting has a default.

use std::time::Duration;

use crate::blob::S3Settings;
use crate::constants::*;
use crate::store::StoreSettings;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// HTTP listen port
    pub port: u16,
    /// Bucket holding credential objects
    pub bucket: String,
    pub region: String,
    /// Custom S3 endpoint (S3-compatible server)
    pub s3_endpoint: Option<String>,
    pub s3_force_path_style: bool,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE), used when RUST_LOG is unset
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Enable color in text format logs
    pub log_enable_color: bool,
    /// JWKS document of the token issuer
    pub jwks_url: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    /// Age after which cached signing keys are refetched (seconds)
    pub key_refresh_interval_secs: u64,
    pub key_fetch_timeout_secs: u64,
    /// Deadline of one aggregate read (milliseconds)
    pub list_timeout_ms: u64,
    pub list_fetch_concurrency: usize,
    /// Per-request handler timeout (seconds)
    pub request_timeout_secs: u64,
    /// Identity provider API key; sign-in is unavailable without it
    pub firebase_api_key: Option<String>,
    pub firebase_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bucket: DEFAULT_BUCKET.to_string(),
            region: DEFAULT_REGION.to_string(),
            s3_endpoint: None,
            s3_force_path_style: false,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            log_enable_color: false,
            jwks_url: DEFAULT_JWKS_URL.to_string(),
            jwt_issuer: DEFAULT_JWT_ISSUER.to_string(),
            jwt_audience: DEFAULT_JWT_AUDIENCE.to_string(),
            key_refresh_interval_secs: DEFAULT_KEY_REFRESH_INTERVAL_SECS,
            key_fetch_timeout_secs: DEFAULT_KEY_FETCH_TIMEOUT_SECS,
            list_timeout_ms: DEFAULT_LIST_TIMEOUT_MS,
            list_fetch_concurrency: DEFAULT_LIST_FETCH_CONCURRENCY,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            firebase_api_key: None,
            firebase_url: DEFAULT_FIREBASE_URL.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            port: env_var_or_default(&lookup, "PORT", defaults.port),
            bucket: env_var_or_default_str(&lookup, "S3_BUCKET", &defaults.bucket),
            region: env_var_or_default_str(&lookup, "AWS_REGION", &defaults.region),
            s3_endpoint: env_var_non_empty(&lookup, "S3_ENDPOINT"),
            s3_force_path_style: env_var_or_default_bool(
                &lookup,
                "S3_FORCE_PATH_STYLE",
                defaults.s3_force_path_style,
            ),
            log_level: env_var_or_default_str(&lookup, "LOG_LEVEL", &defaults.log_level),
            log_format: env_var_or_default_str(&lookup, "LOG_FORMAT", &defaults.log_format),
            log_enable_color: env_var_or_default_bool(
                &lookup,
                "LOG_ENABLE_COLOR",
                defaults.log_enable_color,
            ),
            jwks_url: env_var_or_default_str(&lookup, "JWKS_URL", &defaults.jwks_url),
            jwt_issuer: env_var_or_default_str(&lookup, "JWT_ISSUER", &defaults.jwt_issuer),
            jwt_audience: env_var_or_default_str(&lookup, "JWT_AUDIENCE", &defaults.jwt_audience),
            key_refresh_interval_secs: env_var_or_default(
                &lookup,
                "KEY_REFRESH_INTERVAL_SECS",
                defaults.key_refresh_interval_secs,
            ),
            key_fetch_timeout_secs: env_var_or_default(
                &lookup,
                "KEY_FETCH_TIMEOUT_SECS",
                defaults.key_fetch_timeout_secs,
            ),
            list_timeout_ms: env_var_or_default(&lookup, "LIST_TIMEOUT_MS", defaults.list_timeout_ms),
            list_fetch_concurrency: env_var_or_default(
                &lookup,
                "LIST_FETCH_CONCURRENCY",
                defaults.list_fetch_concurrency,
            )
            .max(1),
            request_timeout_secs: env_var_or_default(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            ),
            firebase_api_key: env_var_non_empty(&lookup, "FIREBASE_API_KEY"),
            firebase_url: env_var_or_default_str(&lookup, "FIREBASE_URL", &defaults.firebase_url),
        }
    }

    /// Point object storage at the local S3-compatible server
    pub fn use_local_storage(&mut self) {
        self.s3_endpoint = Some(LOCAL_S3_ENDPOINT.to_string());
        self.s3_force_path_style = true;
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            endpoint: self.s3_endpoint.clone(),
            force_path_style: self.s3_force_path_style,
        }
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            list_timeout: Duration::from_millis(self.list_timeout_ms),
            fetch_concurrency: self.list_fetch_concurrency,
        }
    }

    pub fn key_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.key_refresh_interval_secs)
    }

    /// Capped at half the request timeout, so a request blocked on a key refresh still has
    /// time to verify against the cached keys.
    pub fn key_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.key_fetch_timeout_secs).min(self.request_timeout() / 2)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Read environment variable or return default
fn env_var_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| default.to_string())
}

fn env_var_non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

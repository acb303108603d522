//! # Constants
//!
//! Shared constants used throughout the service.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP port for the credential API, metrics and probes
pub const DEFAULT_PORT: u16 = 4000;

/// Default object-storage bucket holding credential objects
pub const DEFAULT_BUCKET: &str = "jackstand-s3-test";

/// Default AWS region for the object-storage client
pub const DEFAULT_REGION: &str = "us-east-1";

/// Endpoint of the local S3-compatible server used by `serve --local`
pub const LOCAL_S3_ENDPOINT: &str = "http://localhost:5002";

/// Public signing keys of the token issuer, JWKS format
pub const DEFAULT_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Expected `iss` claim of bearer tokens
pub const DEFAULT_JWT_ISSUER: &str = "https://securetoken.google.com/passman-fc9e0";

/// Expected `aud` claim of bearer tokens
pub const DEFAULT_JWT_AUDIENCE: &str = "passman-fc9e0";

/// Identity provider REST base used by the sign-in proxy
pub const DEFAULT_FIREBASE_URL: &str = "https://www.googleapis.com/identitytoolkit/v3/relyingparty";

/// Age after which the cached signing keys are considered stale (seconds)
pub const DEFAULT_KEY_REFRESH_INTERVAL_SECS: u64 = 3600;

/// Timeout for one signing-key fetch (seconds), kept well below the request timeout
pub const DEFAULT_KEY_FETCH_TIMEOUT_SECS: u64 = 3;

/// Deadline for one aggregate (list) read, listing plus every object fetch (milliseconds)
pub const DEFAULT_LIST_TIMEOUT_MS: u64 = 5000;

/// Maximum object fetches in flight during one aggregate read
pub const DEFAULT_LIST_FETCH_CONCURRENCY: usize = 8;

/// Per-request handler timeout (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Key-space root shared by every tenant aggregate
pub const KEYSPACE_ROOT: &str = "users";

/// Separator between key-space segments
pub const KEY_SEPARATOR: char = '/';

/// Allowed length range (in characters) of a credential's service name
pub const SERVICE_NAME_MIN_LEN: usize = 3;
pub const SERVICE_NAME_MAX_LEN: usize = 15;

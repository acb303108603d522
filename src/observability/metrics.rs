//! # Metrics
//!
//! Prometheus metrics for monitoring the credential service.
//!
//! ## Metrics Exposed
//!
//! - `credvault_credential_operations_total` - Credential store operations by operation and outcome
//! - `credvault_credential_operation_duration_seconds` - Duration of credential store operations
//! - `credvault_signing_key_refresh_total` - Signing-key refreshes by outcome
//! - `credvault_signing_keys_cached` - Number of signing keys currently cached
//! - `credvault_token_verifications_total` - Bearer token verifications by outcome

use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static CREDENTIAL_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "credvault_credential_operations_total",
            "Total number of credential store operations by operation and outcome",
        ),
        &["operation", "outcome"],
    )
    .expect("Failed to create CREDENTIAL_OPERATIONS_TOTAL metric - this should never happen")
});

static CREDENTIAL_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "credvault_credential_operation_duration_seconds",
            "Duration of credential store operations in seconds",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["operation"],
    )
    .expect("Failed to create CREDENTIAL_OPERATION_DURATION metric - this should never happen")
});

static SIGNING_KEY_REFRESH_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "credvault_signing_key_refresh_total",
            "Total number of signing-key refresh attempts by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create SIGNING_KEY_REFRESH_TOTAL metric - this should never happen")
});

static SIGNING_KEYS_CACHED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "credvault_signing_keys_cached",
        "Number of signing keys currently cached",
    )
    .expect("Failed to create SIGNING_KEYS_CACHED metric - this should never happen")
});

static TOKEN_VERIFICATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "credvault_token_verifications_total",
            "Total number of bearer token verifications by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create TOKEN_VERIFICATIONS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(CREDENTIAL_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CREDENTIAL_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(SIGNING_KEY_REFRESH_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SIGNING_KEYS_CACHED.clone()))?;
    REGISTRY.register(Box::new(TOKEN_VERIFICATIONS_TOTAL.clone()))?;

    Ok(())
}

/// Gather every registered metric family, for the `/metrics` endpoint
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    REGISTRY.gather()
}

/// Record one finished credential store operation
pub fn record_credential_operation(operation: &str, outcome: &str, duration: f64) {
    CREDENTIAL_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
    CREDENTIAL_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}

pub fn increment_key_refresh(outcome: &str) {
    SIGNING_KEY_REFRESH_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn set_signing_keys_cached(count: usize) {
    SIGNING_KEYS_CACHED.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn increment_token_verifications(outcome: &str) {
    TOKEN_VERIFICATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

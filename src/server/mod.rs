//! # HTTP Server
//!
//! Credential API plus metrics, health checks and build status.
//!
//! Provides endpoints:
//! - `/users/credentials...` - Credential CRUD, bearer token required
//! - `/users/signin` - Email/password sign-in proxied to the identity provider
//! - `/status` - Build and runtime information
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always returns 200)
//! - `/readyz` - Readiness probe (returns 200 once start-up finished)
//!
//! The server runs on port 4000 by default (configurable via `PORT` environment variable).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::identity::IdentityExtractor;
use crate::observability::metrics;
use crate::store::CredentialStore;

pub mod auth;
pub mod credentials;
pub mod error;
pub mod signin;

pub use error::ApiError;
pub use signin::{SigninProxy, SigninRequest};

pub struct ServerState {
    pub store: CredentialStore,
    pub identity: IdentityExtractor,
    /// `None` when no identity provider API key is configured
    pub signin: Option<SigninProxy>,
    pub is_ready: Arc<AtomicBool>,
    pub started_at: Instant,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("store", &self.store)
            .field("signin_enabled", &self.signin.is_some())
            .field("is_ready", &self.is_ready.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ServerState {
    pub fn new(
        store: CredentialStore,
        identity: IdentityExtractor,
        signin: Option<SigninProxy>,
    ) -> Self {
        Self {
            store,
            identity,
            signin,
            is_ready: Arc::new(AtomicBool::new(false)),
            started_at: Instant::now(),
        }
    }
}

pub fn build_router(state: Arc<ServerState>, request_timeout: Duration) -> Router {
    let credentials = Router::new()
        .route(
            "/users/credentials",
            post(credentials::create_credential).get(credentials::list_credentials),
        )
        .route(
            "/users/credentials/{credential_id}",
            get(credentials::get_credential).delete(credentials::delete_credential),
        )
        .route(
            "/users/credentials/{credential_id}/{field}",
            put(credentials::update_credential_field),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_identity,
        ));

    Router::new()
        .merge(credentials)
        .route("/users/signin", post(signin::signin))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::POST,
            Method::GET,
            Method::OPTIONS,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::CONTENT_LENGTH,
            header::AUTHORIZATION,
        ])
}

pub async fn start_server(
    port: u16,
    state: Arc<ServerState>,
    request_timeout: Duration,
) -> Result<(), anyhow::Error> {
    let app = build_router(Arc::clone(&state), request_timeout);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);
    state.is_ready.store(true, Ordering::Relaxed);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn status_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let signing_keys = state.identity.key_cache().snapshot().keys().len();
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTime": env!("BUILD_DATETIME"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitHash": env!("BUILD_GIT_HASH"),
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
        "storage": state.store.backend(),
        "signingKeys": signing_keys,
    }))
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = metrics::gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

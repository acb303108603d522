//! Bearer-token middleware for the credential routes.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header::AUTHORIZATION, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::error::ApiError;
use super::ServerState;

/// Verify the request's bearer token and attach the resulting
/// [`TenantIdentity`](crate::identity::TenantIdentity) to the request extensions.
pub async fn require_identity(
    State(state): State<Arc<ServerState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    match state.identity.verify_header(header.as_deref()).await {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

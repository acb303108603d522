//! # Sign-in Proxy
//!
//! Forwards email/password sign-in to the identity provider's `verifyPassword`
//! endpoint and relays its status and JSON body. The service never sees the
//! resulting token again except as a bearer header.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::error::ApiError;
use super::ServerState;
use crate::model::ValidationError;

#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigninRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub return_secure_token: bool,
}

impl fmt::Debug for SigninRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigninRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("return_secure_token", &self.return_secure_token)
            .finish()
    }
}

impl SigninRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.email.trim().is_empty() {
            return Err(ValidationError::Required("email"));
        }
        if self.password.is_empty() {
            return Err(ValidationError::Required("password"));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct SigninProxy {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl fmt::Debug for SigninProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigninProxy")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// The request URL carries the API key in its query, so it is stripped before the error
/// reaches logs or the caller.
fn upstream_error(err: reqwest::Error) -> ApiError {
    ApiError::Upstream(err.without_url().to_string())
}

impl SigninProxy {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/verifyPassword", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }

    /// Forward the sign-in and return the provider's status and body.
    pub async fn forward(&self, request: &SigninRequest) -> Result<(StatusCode, Value), ApiError> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(request)
            .send()
            .await
            .map_err(upstream_error)?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|err| ApiError::Upstream(err.to_string()))?;
        let body = response.json::<Value>().await.map_err(upstream_error)?;
        Ok((status, body))
    }
}

pub async fn signin(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<SigninRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let proxy = state.signin.as_ref().ok_or(ApiError::SigninUnavailable)?;
    let Json(request) = body?;
    request.validate()?;

    let (status, body) = proxy.forward(&request).await?;
    if status.is_success() {
        debug!(email = %request.email, "Sign-in succeeded");
    } else {
        warn!(email = %request.email, status = status.as_u16(), "Sign-in rejected by identity provider");
    }
    Ok((status, Json(body)).into_response())
}

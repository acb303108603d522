//! Mapping of failures onto HTTP responses.
//!
//! Bodies are JSON `{"error": <kind>, "message": <text>}`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::error::{ErrorKind, StoreError};
use crate::identity::AuthError;
use crate::model::ValidationError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("request body rejected: {0}")]
    Body(String),

    #[error("sign-in is not configured")]
    SigninUnavailable,

    #[error("identity provider request failed: {0}")]
    Upstream(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Store(err) => match err.kind() {
                ErrorKind::ValidationFailure => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
                ErrorKind::StorageFailure | ErrorKind::AggregateReadFailure => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            },
            ApiError::Body(_) => StatusCode::BAD_REQUEST,
            ApiError::SigninUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Store(err) => err.kind().as_str(),
            ApiError::Body(_) => ErrorKind::ValidationFailure.as_str(),
            ApiError::SigninUnavailable => "signin_unavailable",
            ApiError::Upstream(_) => "upstream_failure",
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Store(err.into())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Store(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Body(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = Json(ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

//! Credential route handlers. The tenant always comes from the verified token.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::{json, Value};

use super::error::ApiError;
use super::ServerState;
use crate::identity::TenantIdentity;
use crate::model::{parse_credential_id, Credential, CredentialDraft, CredentialField, ValidationError};

pub async fn create_credential(
    State(state): State<Arc<ServerState>>,
    Extension(identity): Extension<TenantIdentity>,
    body: Result<Json<CredentialDraft>, JsonRejection>,
) -> Result<Json<Credential>, ApiError> {
    let Json(draft) = body?;
    let credential = state.store.create(&identity.tenant, draft).await?;
    Ok(Json(credential))
}

/// 204 when the tenant has no credentials.
pub async fn list_credentials(
    State(state): State<Arc<ServerState>>,
    Extension(identity): Extension<TenantIdentity>,
) -> Result<Response, ApiError> {
    let credentials = state.store.list(&identity.tenant).await?;
    if credentials.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(credentials).into_response())
}

pub async fn get_credential(
    State(state): State<Arc<ServerState>>,
    Extension(identity): Extension<TenantIdentity>,
    Path(credential_id): Path<String>,
) -> Result<Json<Credential>, ApiError> {
    let credential_id = parse_credential_id(&credential_id)?;
    let credential = state.store.get(&identity.tenant, credential_id).await?;
    Ok(Json(credential))
}

/// Body is `{"<field>": "<new value>"}`.
pub async fn update_credential_field(
    State(state): State<Arc<ServerState>>,
    Extension(identity): Extension<TenantIdentity>,
    Path((credential_id, field)): Path<(String, String)>,
    body: Result<Json<HashMap<String, Value>>, JsonRejection>,
) -> Result<Json<Credential>, ApiError> {
    let credential_id = parse_credential_id(&credential_id)?;
    let field: CredentialField = field.parse()?;
    let Json(body) = body?;

    let value = body
        .get(field.as_str())
        .and_then(Value::as_str)
        .ok_or(ValidationError::Required(field.as_str()))?
        .to_string();

    let credential = state
        .store
        .update_field(&identity.tenant, credential_id, field, value)
        .await?;
    Ok(Json(credential))
}

pub async fn delete_credential(
    State(state): State<Arc<ServerState>>,
    Extension(identity): Extension<TenantIdentity>,
    Path(credential_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let credential_id = parse_credential_id(&credential_id)?;
    state.store.delete(&identity.tenant, credential_id).await?;
    Ok(Json(json!({
        "status": "deleted",
        "description": "credential deleted OK"
    })))
}

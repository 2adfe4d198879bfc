//! Platform configuration endpoints, delegating to the lifecycle service.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};

use gridkit_common::scopes;
use gridkit_platforms::{CreatePlatform, UpdatePlatform};

use crate::{auth::AuthContext, error::ApiError, state::AppState};

pub async fn create(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
    Json(input): Json<CreatePlatform>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_scope(&[scopes::PLATFORMS_WRITE])?;
    let project = state.project_by_slug(&slug).await?;
    auth.require_project(&project)?;

    let view = state.lifecycle.create(&project, input).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_scope(&[scopes::PLATFORMS_READ, scopes::PLATFORMS_WRITE])?;
    let project = state.project_by_slug(&slug).await?;
    auth.require_project(&project)?;

    Ok(Json(state.lifecycle.find_all(&project).await?))
}

/// Returns decrypted credentials, so the write scope is required.
pub async fn find_one(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((slug, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_scope(&[scopes::PLATFORMS_WRITE])?;
    let project = state.project_by_slug(&slug).await?;
    auth.require_project(&project)?;

    Ok(Json(state.lifecycle.find_one(&project, &id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((slug, id)): Path<(String, String)>,
    Json(input): Json<UpdatePlatform>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_scope(&[scopes::PLATFORMS_WRITE])?;
    let project = state.project_by_slug(&slug).await?;
    auth.require_project(&project)?;

    Ok(Json(state.lifecycle.update(&project, &id, input).await?))
}

pub async fn remove(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((slug, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_scope(&[scopes::PLATFORMS_WRITE])?;
    let project = state.project_by_slug(&slug).await?;
    auth.require_project(&project)?;

    state.lifecycle.remove(&project, &id).await?;
    Ok(Json(serde_json::json!({"message": "Platform deleted"})))
}

pub async fn register_webhook(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((slug, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_scope(&[scopes::PLATFORMS_WRITE])?;
    let project = state.project_by_slug(&slug).await?;
    auth.require_project(&project)?;

    let (webhook_url, webhook_info) = state.lifecycle.register_webhook(&project, &id).await?;
    Ok(Json(serde_json::json!({
        "message": "Webhook registered",
        "webhookUrl": webhook_url,
        "webhookInfo": webhook_info,
    })))
}

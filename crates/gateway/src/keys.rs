//! API-key endpoints. The plaintext secret appears exactly once, in the
//! create response.

use {
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Json},
    },
    chrono::{DateTime, Utc},
    serde::Deserialize,
    tracing::info,
};

use {
    gridkit_common::{Environment, Error, scopes},
    gridkit_store::records::NewApiKey,
    gridkit_vault::{KeyEnv, generate_api_key, hash_api_key, key_prefix, key_suffix, mask_key},
};

use crate::{auth::AuthContext, error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKey {
    pub name: String,
    pub scopes: Vec<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
    Json(input): Json<CreateApiKey>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_scope(&[scopes::KEYS_WRITE])?;
    let project = state.project_by_slug(&slug).await?;
    auth.require_project(&project)?;

    if input.name.trim().is_empty() {
        return Err(ApiError::new(Error::bad_request("key name must not be empty")));
    }
    if input.scopes.is_empty() {
        return Err(ApiError::new(Error::bad_request(
            "at least one scope required",
        )));
    }
    for scope in &input.scopes {
        if scope != scopes::WILDCARD && !scopes::ALL.contains(&scope.as_str()) {
            return Err(ApiError::new(Error::bad_request(format!(
                "unknown scope {scope}"
            ))));
        }
    }

    let env = match input.environment.as_deref() {
        Some(raw) => KeyEnv::parse(raw)
            .ok_or_else(|| ApiError::new(Error::bad_request(format!("unknown key environment {raw}"))))?,
        None => match project.environment {
            Environment::Production => KeyEnv::Live,
            Environment::Staging | Environment::Development => KeyEnv::Test,
        },
    };

    let secret = generate_api_key(env);
    let record = state
        .api_keys
        .insert_api_key(NewApiKey {
            project_id: project.id.clone(),
            key_hash: hash_api_key(&secret),
            key_prefix: key_prefix(&secret).to_string(),
            key_suffix: key_suffix(&secret).to_string(),
            name: input.name,
            scopes: input.scopes,
            expires_at: input.expires_at,
        })
        .await?;

    info!(project = %project.slug, key_id = %record.id, "api key issued");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": record.id,
            // Shown once; only hash + prefix + suffix are stored.
            "key": secret,
            "name": record.name,
            "scopes": record.scopes,
            "keyPrefix": record.key_prefix,
            "keySuffix": record.key_suffix,
            "expiresAt": record.expires_at,
            "createdAt": record.created_at,
        })),
    ))
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_scope(&[scopes::KEYS_READ, scopes::KEYS_WRITE])?;
    let project = state.project_by_slug(&slug).await?;
    auth.require_project(&project)?;

    let keys: Vec<serde_json::Value> = state
        .api_keys
        .list_api_keys(&project.id)
        .await?
        .into_iter()
        .map(|record| {
            serde_json::json!({
                "id": record.id,
                "name": record.name,
                "maskedKey": mask_key(&record.key_prefix, &record.key_suffix),
                "scopes": record.scopes,
                "expiresAt": record.expires_at,
                "revokedAt": record.revoked_at,
                "lastUsedAt": record.last_used_at,
                "createdAt": record.created_at,
            })
        })
        .collect();
    Ok(Json(serde_json::json!({"keys": keys})))
}

pub async fn revoke(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((slug, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_scope(&[scopes::KEYS_WRITE])?;
    let project = state.project_by_slug(&slug).await?;
    auth.require_project(&project)?;

    // Only keys of this project are reachable through this route.
    let owned = state
        .api_keys
        .list_api_keys(&project.id)
        .await?
        .into_iter()
        .any(|k| k.id == id);
    if !owned {
        return Err(ApiError::new(Error::not_found(format!(
            "api key {id} not found"
        ))));
    }

    state.api_keys.revoke_api_key(&id).await?;
    info!(project = %project.slug, key_id = %id, "api key revoked");
    Ok(Json(serde_json::json!({"message": "API key revoked"})))
}

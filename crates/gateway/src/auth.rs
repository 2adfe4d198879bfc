//! API-key guard: an extractor that authenticates the request and stamps
//! the auth context, plus per-handler scope checks.

use {
    axum::{extract::FromRequestParts, http::request::Parts},
    chrono::Utc,
    tracing::debug,
};

use {
    gridkit_common::{Error, scopes},
    gridkit_store::ProjectRecord,
    gridkit_vault::{KEY_PREFIX_LEN, verify_api_key_hash},
};

use crate::{error::ApiError, state::AppState};

pub const API_KEY_HEADER: &str = "x-api-key";

/// A verified identity after successful API-key authentication.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub auth_type: &'static str,
    pub key_id: String,
    pub project_id: String,
    pub scopes: Vec<String>,
}

impl AuthContext {
    /// 403 unless the granted scopes intersect `required` (`*` matches
    /// everything).
    pub fn require_scope(&self, required: &[&str]) -> Result<(), ApiError> {
        if scopes::allows(&self.scopes, required) {
            Ok(())
        } else {
            Err(ApiError::new(Error::forbidden(format!(
                "missing required scope: {}",
                required.join(" or ")
            ))))
        }
    }

    /// 403 when the key belongs to a different project than the route
    /// addresses.
    pub fn require_project(&self, project: &ProjectRecord) -> Result<(), ApiError> {
        if self.project_id == project.id {
            Ok(())
        } else {
            Err(ApiError::new(Error::forbidden(format!(
                "API key does not belong to project {}",
                project.slug
            ))))
        }
    }
}

fn unauthorized(message: &str) -> ApiError {
    ApiError::new(Error::unauthorized(message.to_string()))
}

fn extract_key(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(API_KEY_HEADER) {
        return value.to_str().ok().map(str::trim).map(String::from);
    }
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .map(String::from)
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(key) = extract_key(parts).filter(|k| !k.is_empty()) else {
            return Err(unauthorized("missing API key"));
        };
        if key.len() < KEY_PREFIX_LEN {
            return Err(unauthorized("invalid API key"));
        }

        let record = state
            .api_keys
            .find_api_key_by_prefix(&key[..KEY_PREFIX_LEN])
            .await
            .map_err(|e| ApiError::new(Error::internal("key lookup", e)))?;
        let Some(record) = record else {
            debug!("api key prefix not found");
            return Err(unauthorized("invalid API key"));
        };

        if !verify_api_key_hash(&key, &record.key_hash) {
            debug!(key_id = %record.id, "api key hash mismatch");
            return Err(unauthorized("invalid API key"));
        }
        if !record.is_valid(Utc::now()) {
            debug!(key_id = %record.id, "api key revoked or expired");
            return Err(unauthorized("API key revoked or expired"));
        }

        if !state.limiter.check(&record.id) {
            return Err(ApiError::new(Error::rate_limited(
                "rate limit exceeded for this API key",
            )));
        }

        // Usage stamp is best-effort and never blocks the request.
        {
            let store = std::sync::Arc::clone(&state.api_keys);
            let key_id = record.id.clone();
            tokio::spawn(async move {
                let _ = store.touch_api_key(&key_id, Utc::now()).await;
            });
        }

        Ok(AuthContext {
            auth_type: "api-key",
            key_id: record.id,
            project_id: record.project_id,
            scopes: record.scopes,
        })
    }
}

//! Inbound webhook router: demultiplexes provider callbacks by opaque
//! token and persists the canonical events idempotently.

use {
    axum::{
        body::Bytes,
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Json},
    },
    tracing::{debug, info, warn},
};

use {
    gridkit_dispatch::TenantEvent,
    gridkit_platforms::InboundEvent,
    gridkit_store::{
        PlatformConfigRecord,
        records::{NewReceivedMessage, NewReceivedReaction},
    },
};

use crate::state::AppState;

pub async fn receive(
    State(state): State<AppState>,
    Path((platform, token)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle(state, platform, token, headers, body).await
}

/// Providers may declare extra path segments after the token; they route
/// to the same handler.
pub async fn receive_with_rest(
    State(state): State<AppState>,
    Path((platform, token, _rest)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle(state, platform, token, headers, body).await
}

async fn handle(
    state: AppState,
    platform: String,
    token: String,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    // Unknown tokens 404 without revealing whether the platform exists.
    let config = match state.platform_configs.find_platform_by_webhook_token(&token).await {
        Ok(Some(config)) if config.platform == platform => config,
        Ok(_) => {
            debug!(platform = %platform, "webhook token not found");
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"message": "Not found", "code": "NotFound"})),
            )
                .into_response();
        },
        Err(err) => {
            warn!(error = %err, "webhook config lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        },
    };

    if !config.is_active {
        return (
            StatusCode::GONE,
            Json(serde_json::json!({"message": "Platform is not active", "code": "Gone"})),
        )
            .into_response();
    }

    // Parse failures and unknown providers are acknowledged with 200:
    // provider-side retry storms are worse than a dropped malformed
    // callback, and idempotent ingest makes the 200 safe.
    let events = parse_events(&state, &config, &headers, &body).await;
    let mut stored = 0usize;
    for event in events {
        if persist_event(&state, &config, event).await {
            stored += 1;
        }
    }

    info!(
        platform = %config.platform,
        platform_config_id = %config.id,
        stored,
        "inbound webhook processed"
    );
    (StatusCode::OK, Json(serde_json::json!({"success": true}))).into_response()
}

async fn parse_events(
    state: &AppState,
    config: &PlatformConfigRecord,
    headers: &HeaderMap,
    body: &Bytes,
) -> Vec<InboundEvent> {
    let Some(provider) = state.registry.provider(&config.platform) else {
        warn!(platform = %config.platform, "no provider registered for inbound webhook");
        return Vec::new();
    };
    let credentials = match state.vault.decrypt_json(&config.credentials_encrypted) {
        Ok(credentials) => credentials,
        Err(err) => {
            warn!(platform_config_id = %config.id, error = %err, "credential decryption failed on inbound path");
            return Vec::new();
        },
    };
    match provider.parse_inbound(&credentials, headers, body).await {
        Ok(events) => events,
        Err(err) => {
            warn!(
                platform = %config.platform,
                platform_config_id = %config.id,
                error = %err,
                "inbound payload parse failed, acknowledging anyway"
            );
            Vec::new()
        },
    }
}

/// Returns true when the event was newly stored (duplicates are silently
/// swallowed by the unique constraints).
async fn persist_event(state: &AppState, config: &PlatformConfigRecord, event: InboundEvent) -> bool {
    let result = match event {
        InboundEvent::ReceivedMessage(message) => {
            let inserted = state
                .messages
                .insert_received_message(NewReceivedMessage {
                    platform_config_id: config.id.clone(),
                    provider_message_id: message.provider_message_id.clone(),
                    provider_chat_id: message.provider_chat_id,
                    provider_user_id: message.provider_user_id,
                    text: message.text,
                    raw: message.raw,
                })
                .await;
            if let Ok(true) = inserted {
                state
                    .events
                    .emit(TenantEvent::MessageReceived {
                        project_id: config.project_id.clone(),
                        platform_config_id: config.id.clone(),
                        platform: config.platform.clone(),
                        provider_message_id: message.provider_message_id,
                    })
                    .await;
            }
            inserted
        },
        InboundEvent::ReactionAdded(reaction) | InboundEvent::ReactionRemoved(reaction)
            if reaction.provider_message_id.is_empty() =>
        {
            debug!(platform_config_id = %config.id, "reaction event without message id skipped");
            Ok(false)
        },
        InboundEvent::ReactionAdded(reaction) => {
            persist_reaction(state, config, reaction, false).await
        },
        InboundEvent::ReactionRemoved(reaction) => {
            persist_reaction(state, config, reaction, true).await
        },
    };

    match result {
        Ok(inserted) => inserted,
        Err(err) => {
            warn!(platform_config_id = %config.id, error = %err, "inbound event persist failed");
            false
        },
    }
}

async fn persist_reaction(
    state: &AppState,
    config: &PlatformConfigRecord,
    reaction: gridkit_platforms::InboundReaction,
    removed: bool,
) -> Result<bool, gridkit_store::StoreError> {
    let inserted = state
        .messages
        .insert_received_reaction(NewReceivedReaction {
            platform_config_id: config.id.clone(),
            provider_message_id: reaction.provider_message_id.clone(),
            provider_user_id: reaction.provider_user_id,
            emoji: reaction.emoji.clone(),
            reaction_type: if removed { "removed" } else { "added" }.to_string(),
        })
        .await?;
    if inserted {
        state
            .events
            .emit(TenantEvent::ReactionReceived {
                project_id: config.project_id.clone(),
                platform_config_id: config.id.clone(),
                platform: config.platform.clone(),
                provider_message_id: reaction.provider_message_id,
                emoji: reaction.emoji,
                removed,
            })
            .await;
    }
    Ok(inserted)
}

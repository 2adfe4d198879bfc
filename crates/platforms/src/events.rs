//! Lifecycle events delivered to providers and canonical inbound events
//! parsed from provider callbacks.

use serde::{Deserialize, Serialize};

/// Configuration-change event kinds, in the order a config can experience
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformEventKind {
    Created,
    Activated,
    Deactivated,
    Deleted,
}

/// Delivered to the owning provider on exactly these transitions: create
/// with active, activation flip, deactivation flip, delete (always).
/// Carries decrypted credentials so the provider can touch remote state
/// (webhook deregistration and the like).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformEvent {
    #[serde(rename = "type")]
    pub kind: PlatformEventKind,
    pub project_id: String,
    pub platform_config_id: String,
    pub platform: String,
    pub credentials: serde_json::Value,
    pub test_mode: bool,
}

// ── Inbound events ───────────────────────────────────────────────────────────

/// Canonical event yielded by a provider's inbound parser.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    ReceivedMessage(InboundMessage),
    ReactionAdded(InboundReaction),
    ReactionRemoved(InboundReaction),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub provider_message_id: String,
    pub provider_chat_id: String,
    pub provider_user_id: String,
    pub text: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundReaction {
    pub provider_message_id: String,
    pub provider_user_id: String,
    pub emoji: String,
}

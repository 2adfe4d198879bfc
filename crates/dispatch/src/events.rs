//! Tenant webhook events. Delivery to subscriber endpoints is an external
//! collaborator; the orchestrator and webhook router only emit into this
//! sink.

use {async_trait::async_trait, serde::Serialize, tracing::info};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TenantEvent {
    #[serde(rename = "message.sent")]
    MessageSent {
        project_id: String,
        job_id: String,
        platform_config_id: String,
        platform: String,
        target_chat_id: String,
        provider_message_id: String,
        tracking_id: Option<String>,
    },
    #[serde(rename = "message.failed")]
    MessageFailed {
        project_id: String,
        job_id: String,
        platform_config_id: String,
        platform: String,
        target_chat_id: String,
        error: String,
        tracking_id: Option<String>,
    },
    #[serde(rename = "message.received")]
    MessageReceived {
        project_id: String,
        platform_config_id: String,
        platform: String,
        provider_message_id: String,
    },
    #[serde(rename = "reaction.received")]
    ReactionReceived {
        project_id: String,
        platform_config_id: String,
        platform: String,
        provider_message_id: String,
        emoji: String,
        removed: bool,
    },
}

#[async_trait]
pub trait TenantEventSink: Send + Sync {
    async fn emit(&self, event: TenantEvent);
}

/// Sink that drops everything. Test wiring.
pub struct NullEventSink;

#[async_trait]
impl TenantEventSink for NullEventSink {
    async fn emit(&self, _event: TenantEvent) {}
}

/// Sink that logs each event; stands in until a tenant webhook dispatcher
/// is attached.
pub struct TracingEventSink;

#[async_trait]
impl TenantEventSink for TracingEventSink {
    async fn emit(&self, event: TenantEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(event = %payload, "tenant event"),
            Err(_) => info!(?event, "tenant event"),
        }
    }
}

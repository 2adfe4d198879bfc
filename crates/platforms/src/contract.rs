//! The per-provider capability contract.
//!
//! A provider is a process-wide singleton for one platform kind; an
//! adapter is one live instance bound to one `(project, platform config)`
//! pair. Optional capabilities default to [`PlatformError::Unsupported`]
//! so the orchestrator degrades instead of crashing.

use std::sync::Arc;

use {async_trait::async_trait, serde::Serialize};

use {
    gridkit_attachments::ResolvedAttachment,
    gridkit_common::types::{Button, Embed, SendTarget},
};

use crate::{
    error::PlatformError,
    events::{InboundEvent, PlatformEvent},
};

/// Identity of an adapter in the registry: `{project_id}:{platform_config_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub project_id: String,
    pub platform_config_id: String,
}

impl ConnectionKey {
    #[must_use]
    pub fn new(project_id: impl Into<String>, platform_config_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            platform_config_id: platform_config_id.into(),
        }
    }
}

impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.project_id, self.platform_config_id)
    }
}

/// How a provider talks to its platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Websocket,
    Webhook,
    Polling,
    Http,
}

/// Adapter connection state machine. Terminal transitions are one-way
/// except `Connecting` re-entered on reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    Uninitialized,
    Connecting,
    Ready,
    Degraded,
    ShuttingDown,
    Terminated,
}

/// One fan-out delivery, fully resolved: attachments are bytes, options
/// flattened.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub target: SendTarget,
    pub text: Option<String>,
    pub buttons: Vec<Button>,
    pub embeds: Vec<Embed>,
    pub attachments: Vec<ResolvedAttachment>,
    pub reply_to: Option<String>,
    pub silent: bool,
}

/// Successful provider send.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    /// The platform's own message id, used for later reactions/edits.
    pub provider_message_id: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub raw: serde_json::Value,
}

/// Inbound webhook surface declared by a provider.
#[derive(Debug, Clone, Copy)]
pub struct WebhookConfig {
    /// Extra path segments expected after the token segment, if any.
    pub path_suffix: Option<&'static str>,
}

/// A live connection to one platform instance. Safe to call from many
/// workers concurrently.
#[async_trait]
pub trait PlatformAdapter: Send + Sync + std::fmt::Debug {
    fn connection_key(&self) -> &ConnectionKey;

    fn state(&self) -> AdapterState;

    async fn send_message(&self, message: &OutboundMessage)
    -> Result<SendOutcome, PlatformError>;

    async fn send_reaction(
        &self,
        _chat_id: &str,
        _provider_message_id: &str,
        _emoji: &str,
    ) -> Result<(), PlatformError> {
        Err(PlatformError::unsupported("reactions"))
    }

    async fn remove_reaction(
        &self,
        _chat_id: &str,
        _provider_message_id: &str,
        _emoji: &str,
    ) -> Result<(), PlatformError> {
        Err(PlatformError::unsupported("reaction removal"))
    }

    /// Tear down the connection. Idempotent.
    async fn shutdown(&self) {}
}

/// Process-wide singleton for one platform kind.
#[async_trait]
pub trait PlatformProvider: Send + Sync {
    /// Lowercase registry name, e.g. `telegram`.
    fn name(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    fn connection_type(&self) -> ConnectionType;

    /// Check a credential object against the per-platform schema before it
    /// is encrypted and persisted.
    fn validate_credentials(&self, credentials: &serde_json::Value) -> Result<(), PlatformError>;

    async fn initialize(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn shutdown(&self) {}

    async fn create_adapter(
        &self,
        key: ConnectionKey,
        credentials: serde_json::Value,
    ) -> Result<Arc<dyn PlatformAdapter>, PlatformError>;

    /// Configuration-change notification. Default: ignore.
    async fn on_platform_event(&self, _event: &PlatformEvent) {}

    /// Inbound webhook surface; `None` when the provider has no inbound
    /// path.
    fn webhook_config(&self) -> Option<WebhookConfig> {
        None
    }

    /// Provider-specific external webhook registration (e.g. Telegram
    /// `setWebhook`). Idempotent.
    async fn register_webhook(
        &self,
        _credentials: &serde_json::Value,
        _webhook_url: &str,
    ) -> Result<serde_json::Value, PlatformError> {
        Err(PlatformError::unsupported("webhook registration"))
    }

    /// Parse a provider callback body into zero or more canonical events.
    async fn parse_inbound(
        &self,
        _credentials: &serde_json::Value,
        _headers: &http::HeaderMap,
        _body: &[u8],
    ) -> Result<Vec<InboundEvent>, PlatformError> {
        Ok(Vec::new())
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

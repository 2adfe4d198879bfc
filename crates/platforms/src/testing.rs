//! Scripted in-memory provider for exercising dispatch and webhook paths.
//!
//! Failure behavior is driven by the credential object, so end-to-end
//! tests can script one platform config to fail without touching another:
//! `{"failSend": "permanent" | "transient" | "unauthorized"}`.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;

use crate::{
    contract::{
        AdapterState, ConnectionKey, ConnectionType, OutboundMessage, PlatformAdapter,
        PlatformProvider, SendOutcome, WebhookConfig,
    },
    error::PlatformError,
    events::{InboundEvent, InboundMessage, InboundReaction, PlatformEvent},
};

pub struct MockProvider {
    name: &'static str,
    events: Mutex<Vec<PlatformEvent>>,
    registered_webhooks: Mutex<Vec<String>>,
}

impl MockProvider {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            events: Mutex::new(Vec::new()),
            registered_webhooks: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn shared(name: &'static str) -> Arc<dyn PlatformProvider> {
        Arc::new(Self::new(name))
    }

    #[must_use]
    pub fn recorded_events(&self) -> Vec<PlatformEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    #[must_use]
    pub fn registered_webhooks(&self) -> Vec<String> {
        self.registered_webhooks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl PlatformProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn display_name(&self) -> &'static str {
        "Mock"
    }

    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Http
    }

    fn validate_credentials(&self, credentials: &serde_json::Value) -> Result<(), PlatformError> {
        if credentials.get("invalid").and_then(serde_json::Value::as_bool) == Some(true) {
            return Err(PlatformError::invalid_credentials("scripted rejection"));
        }
        Ok(())
    }

    async fn create_adapter(
        &self,
        key: ConnectionKey,
        credentials: serde_json::Value,
    ) -> Result<Arc<dyn PlatformAdapter>, PlatformError> {
        let fail_send = credentials
            .get("failSend")
            .and_then(serde_json::Value::as_str)
            .map(String::from);
        Ok(Arc::new(MockAdapter {
            key,
            fail_send,
            counter: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
        }))
    }

    async fn on_platform_event(&self, event: &PlatformEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }

    fn webhook_config(&self) -> Option<WebhookConfig> {
        Some(WebhookConfig { path_suffix: None })
    }

    async fn register_webhook(
        &self,
        _credentials: &serde_json::Value,
        webhook_url: &str,
    ) -> Result<serde_json::Value, PlatformError> {
        self.registered_webhooks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(webhook_url.to_string());
        Ok(serde_json::json!({"registered": true, "url": webhook_url}))
    }

    /// Canonical envelope: `{"events": [{"type": "message", ...}, ...]}`.
    async fn parse_inbound(
        &self,
        _credentials: &serde_json::Value,
        _headers: &http::HeaderMap,
        body: &[u8],
    ) -> Result<Vec<InboundEvent>, PlatformError> {
        let payload: serde_json::Value = serde_json::from_slice(body)?;
        let Some(items) = payload.get("events").and_then(serde_json::Value::as_array) else {
            return Ok(Vec::new());
        };

        let mut events = Vec::new();
        for item in items {
            let kind = item.get("type").and_then(serde_json::Value::as_str);
            let field = |name: &str| {
                item.get(name)
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            match kind {
                Some("message") => events.push(InboundEvent::ReceivedMessage(InboundMessage {
                    provider_message_id: field("id"),
                    provider_chat_id: field("chatId"),
                    provider_user_id: field("userId"),
                    text: item
                        .get("text")
                        .and_then(serde_json::Value::as_str)
                        .map(String::from),
                    raw: item.clone(),
                })),
                Some("reaction_added") => {
                    events.push(InboundEvent::ReactionAdded(InboundReaction {
                        provider_message_id: field("messageId"),
                        provider_user_id: field("userId"),
                        emoji: field("emoji"),
                    }));
                },
                Some("reaction_removed") => {
                    events.push(InboundEvent::ReactionRemoved(InboundReaction {
                        provider_message_id: field("messageId"),
                        provider_user_id: field("userId"),
                        emoji: field("emoji"),
                    }));
                },
                _ => {},
            }
        }
        Ok(events)
    }
}

#[derive(Debug)]
pub struct MockAdapter {
    key: ConnectionKey,
    fail_send: Option<String>,
    counter: AtomicU64,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl MockAdapter {
    #[must_use]
    pub fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn connection_key(&self) -> &ConnectionKey {
        &self.key
    }

    fn state(&self) -> AdapterState {
        AdapterState::Ready
    }

    async fn send_message(
        &self,
        message: &OutboundMessage,
    ) -> Result<SendOutcome, PlatformError> {
        match self.fail_send.as_deref() {
            Some("transient") => return Err(PlatformError::transient("scripted outage")),
            Some("permanent") => return Err(PlatformError::permanent("scripted rejection")),
            Some("unauthorized") => {
                return Err(PlatformError::unauthorized("scripted auth failure"));
            },
            _ => {},
        }

        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.clone());
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(SendOutcome {
            provider_message_id: format!("mock-{}-{n}", self.key.platform_config_id),
            raw: serde_json::Value::Null,
        })
    }

    async fn send_reaction(
        &self,
        _chat_id: &str,
        _provider_message_id: &str,
        _emoji: &str,
    ) -> Result<(), PlatformError> {
        Ok(())
    }
}

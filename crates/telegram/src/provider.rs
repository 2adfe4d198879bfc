//! Provider and adapter wiring.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use gridkit_platforms::{
    AdapterState, ConnectionKey, ConnectionType, InboundEvent, OutboundMessage, PlatformAdapter,
    PlatformError, PlatformProvider, SendOutcome, WebhookConfig,
};

use crate::{config::TelegramCredentials, inbound, outbound::BotApi};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TelegramProvider {
    http: reqwest::Client,
}

impl TelegramProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn shared() -> Arc<dyn PlatformProvider> {
        Arc::new(Self::new())
    }
}

impl Default for TelegramProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformProvider for TelegramProvider {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn display_name(&self) -> &'static str {
        "Telegram"
    }

    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Webhook
    }

    fn validate_credentials(&self, credentials: &serde_json::Value) -> Result<(), PlatformError> {
        TelegramCredentials::parse(credentials).map(|_| ())
    }

    async fn create_adapter(
        &self,
        key: ConnectionKey,
        credentials: serde_json::Value,
    ) -> Result<Arc<dyn PlatformAdapter>, PlatformError> {
        let credentials = TelegramCredentials::parse(&credentials)?;
        Ok(Arc::new(TelegramAdapter {
            key,
            api: BotApi::new(self.http.clone(), &credentials),
            state: std::sync::RwLock::new(AdapterState::Ready),
        }))
    }

    fn webhook_config(&self) -> Option<WebhookConfig> {
        Some(WebhookConfig { path_suffix: None })
    }

    async fn register_webhook(
        &self,
        credentials: &serde_json::Value,
        webhook_url: &str,
    ) -> Result<serde_json::Value, PlatformError> {
        let credentials = TelegramCredentials::parse(credentials)?;
        BotApi::new(self.http.clone(), &credentials)
            .set_webhook(webhook_url)
            .await
    }

    async fn parse_inbound(
        &self,
        _credentials: &serde_json::Value,
        _headers: &http::HeaderMap,
        body: &[u8],
    ) -> Result<Vec<InboundEvent>, PlatformError> {
        inbound::parse_update(body)
    }
}

#[derive(Debug)]
pub struct TelegramAdapter {
    key: ConnectionKey,
    api: BotApi,
    state: std::sync::RwLock<AdapterState>,
}

#[async_trait]
impl PlatformAdapter for TelegramAdapter {
    fn connection_key(&self) -> &ConnectionKey {
        &self.key
    }

    fn state(&self) -> AdapterState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    async fn send_message(&self, message: &OutboundMessage) -> Result<SendOutcome, PlatformError> {
        self.api.send(message).await
    }

    async fn send_reaction(
        &self,
        chat_id: &str,
        provider_message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        self.api
            .set_reaction(chat_id, provider_message_id, Some(emoji))
            .await
    }

    async fn remove_reaction(
        &self,
        chat_id: &str,
        provider_message_id: &str,
        _emoji: &str,
    ) -> Result<(), PlatformError> {
        self.api.set_reaction(chat_id, provider_message_id, None).await
    }

    async fn shutdown(&self) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = AdapterState::Terminated;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        gridkit_common::types::{SendTarget, TargetType},
    };

    const TOKEN: &str = "123456:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw";

    async fn adapter_for(server: &mockito::ServerGuard) -> Arc<dyn PlatformAdapter> {
        let provider = TelegramProvider::new();
        provider
            .create_adapter(
                ConnectionKey::new("proj_1", "pc_1"),
                serde_json::json!({"botToken": TOKEN, "apiBaseUrl": server.url()}),
            )
            .await
            .unwrap()
    }

    fn text_message(text: &str) -> OutboundMessage {
        OutboundMessage {
            target: SendTarget {
                platform_id: "pc_1".into(),
                target_type: TargetType::Channel,
                id: "-100555".into(),
            },
            text: Some(text.into()),
            buttons: Vec::new(),
            embeds: Vec::new(),
            attachments: Vec::new(),
            reply_to: None,
            silent: false,
        }
    }

    #[tokio::test]
    async fn send_text_returns_provider_message_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", format!("/bot{TOKEN}/sendMessage").as_str())
            .with_status(200)
            .with_body(
                serde_json::json!({"ok": true, "result": {"message_id": 99}}).to_string(),
            )
            .create_async()
            .await;

        let adapter = adapter_for(&server).await;
        let outcome = adapter.send_message(&text_message("hello")).await.unwrap();
        assert_eq!(outcome.provider_message_id, "99");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_is_not_retryable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", format!("/bot{TOKEN}/sendMessage").as_str())
            .with_status(401)
            .with_body(
                serde_json::json!({"ok": false, "description": "Unauthorized"}).to_string(),
            )
            .create_async()
            .await;

        let adapter = adapter_for(&server).await;
        let err = adapter.send_message(&text_message("hello")).await.unwrap_err();
        assert!(matches!(err, PlatformError::Unauthorized { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn rate_limit_is_retryable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", format!("/bot{TOKEN}/sendMessage").as_str())
            .with_status(429)
            .with_body(
                serde_json::json!({
                    "ok": false,
                    "description": "Too Many Requests: retry after 5",
                    "parameters": {"retry_after": 5}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let adapter = adapter_for(&server).await;
        let err = adapter.send_message(&text_message("hello")).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn register_webhook_round_trips() {
        let mut server = mockito::Server::new_async().await;
        let set = server
            .mock("POST", format!("/bot{TOKEN}/setWebhook").as_str())
            .with_status(200)
            .with_body(serde_json::json!({"ok": true, "result": true}).to_string())
            .create_async()
            .await;
        server
            .mock("POST", format!("/bot{TOKEN}/getWebhookInfo").as_str())
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "ok": true,
                    "result": {"url": "https://api.example.com/webhooks/telegram/tok"}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let provider = TelegramProvider::new();
        let info = provider
            .register_webhook(
                &serde_json::json!({"botToken": TOKEN, "apiBaseUrl": server.url()}),
                "https://api.example.com/webhooks/telegram/tok",
            )
            .await
            .unwrap();
        assert_eq!(
            info["url"],
            "https://api.example.com/webhooks/telegram/tok"
        );
        set.assert_async().await;
    }
}

//! Provider and adapter wiring.
//!
//! Sends go over the REST API; a resident gateway websocket is provider
//! wire protocol outside the adapter contract, so inbound traffic arrives
//! as forwarded dispatch envelopes on the webhook route.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use gridkit_platforms::{
    AdapterState, ConnectionKey, ConnectionType, InboundEvent, OutboundMessage, PlatformAdapter,
    PlatformError, PlatformProvider, SendOutcome, WebhookConfig,
};

use crate::{config::DiscordCredentials, inbound, rest::DiscordRest};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DiscordProvider {
    http: reqwest::Client,
}

impl DiscordProvider {
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

impl Default for DiscordProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformProvider for DiscordProvider {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn display_name(&self) -> &'static str {
        "Discord"
    }

    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Http
    }

    fn validate_credentials(&self, credentials: &serde_json::Value) -> Result<(), PlatformError> {
        DiscordCredentials::parse(credentials).map(|_| ())
    }

    async fn create_adapter(
        &self,
        key: ConnectionKey,
        credentials: serde_json::Value,
    ) -> Result<Arc<dyn PlatformAdapter>, PlatformError> {
        let credentials = DiscordCredentials::parse(&credentials)?;
        Ok(Arc::new(DiscordAdapter {
            key,
            rest: DiscordRest::new(self.http.clone(), &credentials),
            state: std::sync::RwLock::new(AdapterState::Ready),
        }))
    }

    fn webhook_config(&self) -> Option<WebhookConfig> {
        Some(WebhookConfig { path_suffix: None })
    }

    async fn parse_inbound(
        &self,
        _credentials: &serde_json::Value,
        _headers: &http::HeaderMap,
        body: &[u8],
    ) -> Result<Vec<InboundEvent>, PlatformError> {
        inbound::parse_dispatch(body)
    }
}

#[derive(Debug)]
pub struct DiscordAdapter {
    key: ConnectionKey,
    rest: DiscordRest,
    state: std::sync::RwLock<AdapterState>,
}

#[async_trait]
impl PlatformAdapter for DiscordAdapter {
    fn connection_key(&self) -> &ConnectionKey {
        &self.key
    }

    fn state(&self) -> AdapterState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    async fn send_message(&self, message: &OutboundMessage) -> Result<SendOutcome, PlatformError> {
        self.rest.send(message).await
    }

    async fn send_reaction(
        &self,
        chat_id: &str,
        provider_message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        self.rest
            .set_reaction(chat_id, provider_message_id, emoji, true)
            .await
    }

    async fn remove_reaction(
        &self,
        chat_id: &str,
        provider_message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        self.rest
            .set_reaction(chat_id, provider_message_id, emoji, false)
            .await
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

    async fn adapter_for(server: &mockito::ServerGuard) -> Arc<dyn PlatformAdapter> {
        DiscordProvider::new()
            .create_adapter(
                ConnectionKey::new("proj_1", "pc_1"),
                serde_json::json!({"botToken": "bot-token", "apiBaseUrl": server.url()}),
            )
            .await
            .unwrap()
    }

    fn message(target_type: TargetType, id: &str) -> OutboundMessage {
        OutboundMessage {
            target: SendTarget {
                platform_id: "pc_1".into(),
                target_type,
                id: id.into(),
            },
            text: Some("hello".into()),
            buttons: Vec::new(),
            embeds: Vec::new(),
            attachments: Vec::new(),
            reply_to: None,
            silent: false,
        }
    }

    #[tokio::test]
    async fn channel_send_returns_message_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/channels/222/messages")
            .match_header("authorization", "Bot bot-token")
            .with_status(200)
            .with_body(serde_json::json!({"id": "999", "channel_id": "222"}).to_string())
            .create_async()
            .await;

        let adapter = adapter_for(&server).await;
        let outcome = adapter
            .send_message(&message(TargetType::Channel, "222"))
            .await
            .unwrap();
        assert_eq!(outcome.provider_message_id, "999");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn user_send_opens_dm_channel_first() {
        let mut server = mockito::Server::new_async().await;
        let dm = server
            .mock("POST", "/users/@me/channels")
            .with_status(200)
            .with_body(serde_json::json!({"id": "777"}).to_string())
            .create_async()
            .await;
        let send = server
            .mock("POST", "/channels/777/messages")
            .with_status(200)
            .with_body(serde_json::json!({"id": "1000"}).to_string())
            .create_async()
            .await;

        let adapter = adapter_for(&server).await;
        let outcome = adapter
            .send_message(&message(TargetType::User, "user-1"))
            .await
            .unwrap();
        assert_eq!(outcome.provider_message_id, "1000");
        dm.assert_async().await;
        send.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_is_retryable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/channels/222/messages")
            .with_status(502)
            .with_body("{\"message\": \"bad gateway\"}")
            .create_async()
            .await;

        let adapter = adapter_for(&server).await;
        let err = adapter
            .send_message(&message(TargetType::Channel, "222"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn reactions_use_put_and_delete() {
        let mut server = mockito::Server::new_async().await;
        let put = server
            .mock("PUT", "/channels/222/messages/999/reactions/%F0%9F%91%8D/@me")
            .with_status(204)
            .create_async()
            .await;
        let del = server
            .mock("DELETE", "/channels/222/messages/999/reactions/%F0%9F%91%8D/@me")
            .with_status(204)
            .create_async()
            .await;

        let adapter = adapter_for(&server).await;
        adapter.send_reaction("222", "999", "👍").await.unwrap();
        adapter.remove_reaction("222", "999", "👍").await.unwrap();
        put.assert_async().await;
        del.assert_async().await;
    }
}

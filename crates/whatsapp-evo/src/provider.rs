//! Provider and adapter wiring for Evolution API.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    base64::Engine,
    serde_json::json,
    tracing::{debug, info},
};

use {
    gridkit_attachments::AttachmentClass,
    gridkit_platforms::{
        AdapterState, ConnectionKey, ConnectionType, InboundEvent, OutboundMessage,
        PlatformAdapter, PlatformError, PlatformProvider, SendOutcome, WebhookConfig,
    },
};

use crate::{config::EvolutionCredentials, inbound};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct WhatsAppEvoProvider {
    http: reqwest::Client,
}

impl WhatsAppEvoProvider {
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

impl Default for WhatsAppEvoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformProvider for WhatsAppEvoProvider {
    fn name(&self) -> &'static str {
        "whatsapp-evo"
    }

    fn display_name(&self) -> &'static str {
        "WhatsApp (Evolution API)"
    }

    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Webhook
    }

    fn validate_credentials(&self, credentials: &serde_json::Value) -> Result<(), PlatformError> {
        EvolutionCredentials::parse(credentials).map(|_| ())
    }

    async fn create_adapter(
        &self,
        key: ConnectionKey,
        credentials: serde_json::Value,
    ) -> Result<Arc<dyn PlatformAdapter>, PlatformError> {
        let credentials = EvolutionCredentials::parse(&credentials)?;
        Ok(Arc::new(WhatsAppEvoAdapter {
            key,
            http: self.http.clone(),
            credentials,
            state: std::sync::RwLock::new(AdapterState::Ready),
        }))
    }

    fn webhook_config(&self) -> Option<WebhookConfig> {
        Some(WebhookConfig { path_suffix: None })
    }

    /// Point the Evolution instance's webhook at the gateway.
    async fn register_webhook(
        &self,
        credentials: &serde_json::Value,
        webhook_url: &str,
    ) -> Result<serde_json::Value, PlatformError> {
        let credentials = EvolutionCredentials::parse(credentials)?;
        let url = format!(
            "{}/webhook/set/{}",
            credentials.base(),
            credentials.instance_name
        );
        let response = self
            .http
            .post(url)
            .header("apikey", &credentials.api_key)
            .json(&json!({
                "webhook": {
                    "enabled": true,
                    "url": webhook_url,
                    "events": ["MESSAGES_UPSERT"]
                }
            }))
            .send()
            .await
            .map_err(request_error)?;
        parse_response("set webhook", response).await
    }

    async fn parse_inbound(
        &self,
        _credentials: &serde_json::Value,
        _headers: &http::HeaderMap,
        body: &[u8],
    ) -> Result<Vec<InboundEvent>, PlatformError> {
        inbound::parse_event(body)
    }
}

#[derive(Debug)]
pub struct WhatsAppEvoAdapter {
    key: ConnectionKey,
    http: reqwest::Client,
    credentials: EvolutionCredentials,
    state: std::sync::RwLock<AdapterState>,
}

impl WhatsAppEvoAdapter {
    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/message/{method}/{}",
            self.credentials.base(),
            self.credentials.instance_name
        )
    }

    async fn post(
        &self,
        context: &str,
        url: String,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, PlatformError> {
        let response = self
            .http
            .post(url)
            .header("apikey", &self.credentials.api_key)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        parse_response(context, response).await
    }
}

#[async_trait]
impl PlatformAdapter for WhatsAppEvoAdapter {
    fn connection_key(&self) -> &ConnectionKey {
        &self.key
    }

    fn state(&self) -> AdapterState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    async fn send_message(&self, message: &OutboundMessage) -> Result<SendOutcome, PlatformError> {
        let number = message.target.id.clone();
        let mut provider_message_id: Option<String> = None;
        let mut raw = serde_json::Value::Null;

        if let Some(text) = message.text.as_deref().filter(|t| !t.is_empty()) {
            let result = self
                .post(
                    "send text",
                    self.endpoint("sendText"),
                    json!({"number": number, "text": text}),
                )
                .await?;
            provider_message_id = message_id_of(&result);
            raw = result;
        }

        for attachment in &message.attachments {
            let mediatype = match attachment.class {
                AttachmentClass::Image => "image",
                AttachmentClass::Video => "video",
                AttachmentClass::Audio => "audio",
                AttachmentClass::Document => "document",
            };
            let media = base64::engine::general_purpose::STANDARD.encode(&attachment.bytes);
            let mut body = json!({
                "number": number,
                "mediatype": mediatype,
                "mimetype": attachment.mime_type,
                "fileName": attachment.filename,
                "media": media,
            });
            if let Some(caption) = &attachment.caption {
                body["caption"] = json!(caption);
            }
            let result = self
                .post("send media", self.endpoint("sendMedia"), body)
                .await?;
            if provider_message_id.is_none() {
                provider_message_id = message_id_of(&result);
                raw = result;
            }
        }

        let provider_message_id = provider_message_id.ok_or_else(|| {
            PlatformError::permanent("evolution api returned no message id for any part")
        })?;
        info!(number = %message.target.id, provider_message_id = %provider_message_id, "whatsapp message sent");
        Ok(SendOutcome {
            provider_message_id,
            raw,
        })
    }

    async fn send_reaction(
        &self,
        chat_id: &str,
        provider_message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        self.post(
            "send reaction",
            self.endpoint("sendReaction"),
            json!({
                "key": {"remoteJid": chat_id, "fromMe": false, "id": provider_message_id},
                "reaction": emoji,
            }),
        )
        .await?;
        Ok(())
    }

    async fn remove_reaction(
        &self,
        chat_id: &str,
        provider_message_id: &str,
        _emoji: &str,
    ) -> Result<(), PlatformError> {
        // WhatsApp removes a reaction by sending the empty string.
        self.post(
            "remove reaction",
            self.endpoint("sendReaction"),
            json!({
                "key": {"remoteJid": chat_id, "fromMe": false, "id": provider_message_id},
                "reaction": "",
            }),
        )
        .await?;
        Ok(())
    }

    async fn shutdown(&self) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = AdapterState::Terminated;
    }
}

fn request_error(err: reqwest::Error) -> PlatformError {
    if err.is_timeout() || err.is_connect() {
        PlatformError::transient(format!("evolution api request: {err}"))
    } else {
        PlatformError::permanent(format!("evolution api request: {err}"))
    }
}

async fn parse_response(
    context: &str,
    response: reqwest::Response,
) -> Result<serde_json::Value, PlatformError> {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    if (200..300).contains(&status) {
        if body.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        return serde_json::from_str(&body)
            .map_err(|e| PlatformError::transient(format!("evolution api {context}: {e}")));
    }
    debug!(context, status, body = %body, "evolution api error");
    Err(PlatformError::from_status(
        status,
        format!("evolution api {context}: http {status}"),
    ))
}

fn message_id_of(result: &serde_json::Value) -> Option<String> {
    result
        .get("key")
        .and_then(|k| k.get("id"))
        .and_then(serde_json::Value::as_str)
        .map(String::from)
}

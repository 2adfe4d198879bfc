//! Outbound Bot API calls for one adapter.

use {
    serde_json::json,
    tracing::{debug, info},
};

use {
    gridkit_attachments::{AttachmentClass, ResolvedAttachment},
    gridkit_common::types::{Button, Embed},
    gridkit_platforms::{OutboundMessage, PlatformError, SendOutcome},
};

use crate::config::TelegramCredentials;

#[derive(Debug)]
pub(crate) struct BotApi {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl BotApi {
    pub(crate) fn new(http: reqwest::Client, credentials: &TelegramCredentials) -> Self {
        Self {
            http,
            base: credentials.api_base().trim_end_matches('/').to_string(),
            token: credentials.bot_token.clone(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base, self.token)
    }

    /// POST a JSON-bodied Bot API method and return `result`.
    pub(crate) async fn call(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, PlatformError> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        Self::parse_response(method, response).await
    }

    /// POST a multipart Bot API method (file uploads).
    pub(crate) async fn call_multipart(
        &self,
        method: &str,
        form: reqwest::multipart::Form,
    ) -> Result<serde_json::Value, PlatformError> {
        let response = self
            .http
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;
        Self::parse_response(method, response).await
    }

    async fn parse_response(
        method: &str,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, PlatformError> {
        let status = response.status().as_u16();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlatformError::transient(format!("telegram {method}: {e}")))?;

        if body.get("ok").and_then(serde_json::Value::as_bool) == Some(true) {
            return Ok(body.get("result").cloned().unwrap_or(serde_json::Value::Null));
        }

        let description = body
            .get("description")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown error");
        debug!(method, status, description, "telegram api error");
        Err(PlatformError::from_status(
            status,
            format!("telegram {method}: {description}"),
        ))
    }

    /// Send one fan-out message: text first, then each attachment; the
    /// first provider message id wins.
    pub(crate) async fn send(&self, message: &OutboundMessage) -> Result<SendOutcome, PlatformError> {
        let chat_id = message.target.id.clone();
        let mut provider_message_id: Option<String> = None;
        let mut raw = serde_json::Value::Null;

        let text = render_text(message.text.as_deref(), &message.embeds);
        if let Some(text) = text {
            let mut body = json!({
                "chat_id": chat_id,
                "text": text,
                "disable_notification": message.silent,
            });
            if let Some(reply_to) = &message.reply_to
                && let Ok(id) = reply_to.parse::<i64>()
            {
                body["reply_to_message_id"] = json!(id);
            }
            if let Some(markup) = inline_keyboard(&message.buttons) {
                body["reply_markup"] = markup;
            }
            let result = self.call("sendMessage", body).await?;
            provider_message_id = message_id_of(&result);
            raw = result;
        }

        for attachment in &message.attachments {
            let result = self.send_attachment(&chat_id, attachment, message.silent).await?;
            if provider_message_id.is_none() {
                provider_message_id = message_id_of(&result);
                raw = result;
            }
        }

        let provider_message_id = provider_message_id.ok_or_else(|| {
            PlatformError::permanent("telegram returned no message id for any part")
        })?;
        info!(chat_id = %message.target.id, provider_message_id = %provider_message_id, "telegram message sent");
        Ok(SendOutcome {
            provider_message_id,
            raw,
        })
    }

    async fn send_attachment(
        &self,
        chat_id: &str,
        attachment: &ResolvedAttachment,
        silent: bool,
    ) -> Result<serde_json::Value, PlatformError> {
        let (method, field) = match attachment.class {
            AttachmentClass::Image => ("sendPhoto", "photo"),
            AttachmentClass::Video => ("sendVideo", "video"),
            AttachmentClass::Audio => ("sendAudio", "audio"),
            AttachmentClass::Document => ("sendDocument", "document"),
        };

        let part = reqwest::multipart::Part::bytes(attachment.bytes.clone())
            .file_name(attachment.filename.clone())
            .mime_str(&attachment.mime_type)
            .map_err(|e| PlatformError::permanent(format!("bad attachment mime: {e}")))?;
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("disable_notification", silent.to_string())
            .part(field, part);
        if let Some(caption) = &attachment.caption {
            form = form.text("caption", caption.clone());
        }

        self.call_multipart(method, form).await
    }

    pub(crate) async fn set_webhook(&self, url: &str) -> Result<serde_json::Value, PlatformError> {
        self.call("setWebhook", json!({"url": url})).await?;
        // Echo what Telegram now believes, so callers can verify.
        self.call("getWebhookInfo", json!({})).await
    }

    pub(crate) async fn set_reaction(
        &self,
        chat_id: &str,
        provider_message_id: &str,
        emoji: Option<&str>,
    ) -> Result<(), PlatformError> {
        let message_id: i64 = provider_message_id
            .parse()
            .map_err(|_| PlatformError::permanent("telegram message ids are numeric"))?;
        let reaction = match emoji {
            Some(emoji) => json!([{"type": "emoji", "emoji": emoji}]),
            None => json!([]),
        };
        self.call(
            "setMessageReaction",
            json!({"chat_id": chat_id, "message_id": message_id, "reaction": reaction}),
        )
        .await?;
        Ok(())
    }
}

fn request_error(err: reqwest::Error) -> PlatformError {
    if err.is_timeout() || err.is_connect() {
        PlatformError::transient(format!("telegram request: {err}"))
    } else {
        PlatformError::permanent(format!("telegram request: {err}"))
    }
}

fn message_id_of(result: &serde_json::Value) -> Option<String> {
    result
        .get("message_id")
        .and_then(serde_json::Value::as_i64)
        .map(|id| id.to_string())
}

/// Telegram has no native embeds; fold them into the text body.
fn render_text(text: Option<&str>, embeds: &[Embed]) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(text) = text.filter(|t| !t.is_empty()) {
        parts.push(text.to_string());
    }
    for embed in embeds {
        let mut block = String::new();
        if let Some(title) = &embed.title {
            block.push_str(title);
        }
        if let Some(description) = &embed.description {
            if !block.is_empty() {
                block.push('\n');
            }
            block.push_str(description);
        }
        if let Some(image) = &embed.image_url {
            if !block.is_empty() {
                block.push('\n');
            }
            block.push_str(image);
        }
        if !block.is_empty() {
            parts.push(block);
        }
    }
    if parts.is_empty() { None } else { Some(parts.join("\n\n")) }
}

fn inline_keyboard(buttons: &[Button]) -> Option<serde_json::Value> {
    if buttons.is_empty() {
        return None;
    }
    let rows: Vec<serde_json::Value> = buttons
        .iter()
        .map(|b| json!([{"text": b.text, "callback_data": b.value}]))
        .collect();
    Some(json!({"inline_keyboard": rows}))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_fold_into_text() {
        let embeds = vec![Embed {
            title: Some("Release".into()),
            description: Some("v1.2 is out".into()),
            ..Default::default()
        }];
        let text = render_text(Some("hello"), &embeds).unwrap();
        assert_eq!(text, "hello\n\nRelease\nv1.2 is out");
        assert!(render_text(None, &[]).is_none());
    }

    #[test]
    fn buttons_become_inline_keyboard() {
        let markup = inline_keyboard(&[Button {
            text: "Yes".into(),
            value: "yes".into(),
        }])
        .unwrap();
        assert_eq!(markup["inline_keyboard"][0][0]["callback_data"], "yes");
        assert!(inline_keyboard(&[]).is_none());
    }
}

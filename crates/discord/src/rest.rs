//! Discord REST calls for one adapter.

use {
    serde_json::json,
    tracing::{debug, info},
};

use {
    gridkit_common::types::{Button, Embed, TargetType},
    gridkit_platforms::{OutboundMessage, PlatformError, SendOutcome},
};

use crate::config::DiscordCredentials;

#[derive(Debug)]
pub(crate) struct DiscordRest {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl DiscordRest {
    pub(crate) fn new(http: reqwest::Client, credentials: &DiscordCredentials) -> Self {
        Self {
            http,
            base: credentials.api_base().trim_end_matches('/').to_string(),
            token: credentials.bot_token.clone(),
        }
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
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
                .map_err(|e| PlatformError::transient(format!("discord {context}: {e}")));
        }

        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(serde_json::Value::as_str).map(String::from))
            .unwrap_or_else(|| format!("http {status}"));
        debug!(context, status, message, "discord api error");
        Err(PlatformError::from_status(
            status,
            format!("discord {context}: {message}"),
        ))
    }

    async fn post_json(
        &self,
        context: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, PlatformError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base))
            .header("Authorization", self.auth())
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        Self::parse_response(context, response).await
    }

    /// DMs require opening (or reusing) the DM channel first.
    async fn dm_channel_id(&self, user_id: &str) -> Result<String, PlatformError> {
        let channel = self
            .post_json(
                "create dm",
                "/users/@me/channels",
                json!({"recipient_id": user_id}),
            )
            .await?;
        channel
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(String::from)
            .ok_or_else(|| PlatformError::transient("discord dm channel response missing id"))
    }

    pub(crate) async fn send(
        &self,
        message: &OutboundMessage,
    ) -> Result<SendOutcome, PlatformError> {
        let channel_id = match message.target.target_type {
            TargetType::User => self.dm_channel_id(&message.target.id).await?,
            TargetType::Channel | TargetType::Group => message.target.id.clone(),
        };

        let mut payload = json!({});
        if let Some(text) = message.text.as_deref().filter(|t| !t.is_empty()) {
            payload["content"] = json!(text);
        }
        if !message.embeds.is_empty() {
            payload["embeds"] = json!(
                message.embeds.iter().map(render_embed).collect::<Vec<_>>()
            );
        }
        if !message.buttons.is_empty() {
            payload["components"] = components(&message.buttons);
        }
        if let Some(reply_to) = &message.reply_to {
            payload["message_reference"] = json!({"message_id": reply_to});
        }
        if message.silent {
            // SUPPRESS_NOTIFICATIONS
            payload["flags"] = json!(4096);
        }

        let path = format!("/channels/{channel_id}/messages");
        let result = if message.attachments.is_empty() {
            self.post_json("send message", &path, payload).await?
        } else {
            let mut form = reqwest::multipart::Form::new()
                .text("payload_json", attach_metadata(payload, message)?.to_string());
            for (i, attachment) in message.attachments.iter().enumerate() {
                let part = reqwest::multipart::Part::bytes(attachment.bytes.clone())
                    .file_name(attachment.filename.clone())
                    .mime_str(&attachment.mime_type)
                    .map_err(|e| PlatformError::permanent(format!("bad attachment mime: {e}")))?;
                form = form.part(format!("files[{i}]"), part);
            }
            let response = self
                .http
                .post(format!("{}{path}", self.base))
                .header("Authorization", self.auth())
                .multipart(form)
                .send()
                .await
                .map_err(request_error)?;
            Self::parse_response("send message", response).await?
        };

        let provider_message_id = result
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(String::from)
            .ok_or_else(|| PlatformError::transient("discord message response missing id"))?;
        info!(channel_id = %channel_id, provider_message_id = %provider_message_id, "discord message sent");
        Ok(SendOutcome {
            provider_message_id,
            raw: result,
        })
    }

    pub(crate) async fn set_reaction(
        &self,
        channel_id: &str,
        provider_message_id: &str,
        emoji: &str,
        add: bool,
    ) -> Result<(), PlatformError> {
        let path = format!(
            "{}/channels/{channel_id}/messages/{provider_message_id}/reactions/{}/@me",
            self.base,
            urlencoding::encode(emoji)
        );
        let request = if add {
            self.http.put(path)
        } else {
            self.http.delete(path)
        };
        let response = request
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(request_error)?;
        Self::parse_response("reaction", response).await?;
        Ok(())
    }
}

fn request_error(err: reqwest::Error) -> PlatformError {
    if err.is_timeout() || err.is_connect() {
        PlatformError::transient(format!("discord request: {err}"))
    } else {
        PlatformError::permanent(format!("discord request: {err}"))
    }
}

fn render_embed(embed: &Embed) -> serde_json::Value {
    let mut out = json!({});
    if let Some(title) = &embed.title {
        out["title"] = json!(title);
    }
    if let Some(description) = &embed.description {
        out["description"] = json!(description);
    }
    if let Some(color) = embed.color {
        out["color"] = json!(color);
    }
    if let Some(image_url) = &embed.image_url {
        out["image"] = json!({"url": image_url});
    }
    if let Some(thumbnail_url) = &embed.thumbnail_url {
        out["thumbnail"] = json!({"url": thumbnail_url});
    }
    out
}

/// One action row of secondary-style buttons.
fn components(buttons: &[Button]) -> serde_json::Value {
    let items: Vec<serde_json::Value> = buttons
        .iter()
        .map(|b| {
            json!({
                "type": 2,
                "style": 2,
                "label": b.text,
                "custom_id": b.value,
            })
        })
        .collect();
    json!([{"type": 1, "components": items}])
}

/// Reference the uploaded files from the payload so captions survive.
fn attach_metadata(
    mut payload: serde_json::Value,
    message: &OutboundMessage,
) -> Result<serde_json::Value, PlatformError> {
    let attachments: Vec<serde_json::Value> = message
        .attachments
        .iter()
        .enumerate()
        .map(|(i, a)| {
            json!({
                "id": i,
                "filename": a.filename,
                "description": a.caption,
            })
        })
        .collect();
    payload["attachments"] = serde_json::Value::Array(attachments);
    Ok(payload)
}

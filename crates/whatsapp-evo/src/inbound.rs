//! Parsing of Evolution API webhook events into canonical events.

use gridkit_platforms::{InboundEvent, InboundMessage, InboundReaction, PlatformError};

pub fn parse_event(body: &[u8]) -> Result<Vec<InboundEvent>, PlatformError> {
    let payload: serde_json::Value = serde_json::from_slice(body)?;
    if payload.get("event").and_then(serde_json::Value::as_str) != Some("messages.upsert") {
        return Ok(Vec::new());
    }
    let Some(data) = payload.get("data") else {
        return Ok(Vec::new());
    };

    let key = |name: &str| {
        data.get("key")
            .and_then(|k| k.get(name))
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let message_id = key("id");
    let remote_jid = key("remoteJid");
    if message_id.is_empty() {
        return Ok(Vec::new());
    }

    // Reactions arrive as messages.upsert with a reactionMessage body.
    if let Some(reaction) = data.get("message").and_then(|m| m.get("reactionMessage")) {
        let target_id = reaction
            .get("key")
            .and_then(|k| k.get("id"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let emoji = reaction
            .get("text")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let inbound = InboundReaction {
            provider_message_id: target_id,
            provider_user_id: remote_jid,
            emoji: emoji.clone(),
        };
        // An empty reaction text is WhatsApp's removal signal.
        return Ok(vec![if emoji.is_empty() {
            InboundEvent::ReactionRemoved(inbound)
        } else {
            InboundEvent::ReactionAdded(inbound)
        }]);
    }

    let text = data
        .get("message")
        .and_then(|m| m.get("conversation"))
        .and_then(serde_json::Value::as_str)
        .map(String::from);

    Ok(vec![InboundEvent::ReceivedMessage(InboundMessage {
        provider_message_id: message_id,
        provider_chat_id: remote_jid.clone(),
        provider_user_id: remote_jid,
        text,
        raw: data.clone(),
    })])
}

//! Parsing of Telegram webhook updates into canonical events.

use gridkit_platforms::{InboundEvent, InboundMessage, InboundReaction, PlatformError};

/// One webhook POST carries one update.
pub fn parse_update(body: &[u8]) -> Result<Vec<InboundEvent>, PlatformError> {
    let update: serde_json::Value = serde_json::from_slice(body)?;
    let mut events = Vec::new();

    if let Some(message) = update.get("message") {
        if let Some(event) = parse_message(message) {
            events.push(InboundEvent::ReceivedMessage(event));
        }
    }

    if let Some(reaction) = update.get("message_reaction") {
        events.extend(parse_reaction_change(reaction));
    }

    Ok(events)
}

fn parse_message(message: &serde_json::Value) -> Option<InboundMessage> {
    let message_id = message.get("message_id")?.as_i64()?;
    let chat_id = message.get("chat")?.get("id")?.as_i64()?;
    let user_id = message
        .get("from")
        .and_then(|f| f.get("id"))
        .and_then(serde_json::Value::as_i64)
        .unwrap_or_default();
    Some(InboundMessage {
        provider_message_id: message_id.to_string(),
        provider_chat_id: chat_id.to_string(),
        provider_user_id: user_id.to_string(),
        text: message
            .get("text")
            .and_then(serde_json::Value::as_str)
            .map(String::from),
        raw: message.clone(),
    })
}

/// `message_reaction` updates carry the old and new reaction sets; the
/// diff yields added/removed events.
fn parse_reaction_change(reaction: &serde_json::Value) -> Vec<InboundEvent> {
    let Some(message_id) = reaction.get("message_id").and_then(serde_json::Value::as_i64) else {
        return Vec::new();
    };
    let user_id = reaction
        .get("user")
        .and_then(|u| u.get("id"))
        .and_then(serde_json::Value::as_i64)
        .unwrap_or_default();

    let emojis = |field: &str| -> Vec<String> {
        reaction
            .get(field)
            .and_then(serde_json::Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|r| r.get("emoji").and_then(serde_json::Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    };
    let old = emojis("old_reaction");
    let new = emojis("new_reaction");

    let mut events = Vec::new();
    for emoji in new.iter().filter(|e| !old.contains(e)) {
        events.push(InboundEvent::ReactionAdded(InboundReaction {
            provider_message_id: message_id.to_string(),
            provider_user_id: user_id.to_string(),
            emoji: emoji.clone(),
        }));
    }
    for emoji in old.iter().filter(|e| !new.contains(e)) {
        events.push(InboundEvent::ReactionRemoved(InboundReaction {
            provider_message_id: message_id.to_string(),
            provider_user_id: user_id.to_string(),
            emoji: emoji.clone(),
        }));
    }
    events
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_update_parses() {
        let body = serde_json::json!({
            "update_id": 42,
            "message": {
                "message_id": 7,
                "chat": {"id": -100123},
                "from": {"id": 555},
                "text": "hello"
            }
        });
        let events = parse_update(body.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 1);
        let InboundEvent::ReceivedMessage(message) = &events[0] else {
            panic!("expected message event");
        };
        assert_eq!(message.provider_message_id, "7");
        assert_eq!(message.provider_chat_id, "-100123");
        assert_eq!(message.text.as_deref(), Some("hello"));
    }

    #[test]
    fn reaction_diff_yields_added_and_removed() {
        let body = serde_json::json!({
            "update_id": 43,
            "message_reaction": {
                "message_id": 7,
                "user": {"id": 555},
                "old_reaction": [{"type": "emoji", "emoji": "👎"}],
                "new_reaction": [{"type": "emoji", "emoji": "👍"}]
            }
        });
        let events = parse_update(body.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], InboundEvent::ReactionAdded(_)));
        assert!(matches!(events[1], InboundEvent::ReactionRemoved(_)));
    }

    #[test]
    fn unrelated_update_yields_nothing() {
        let body = serde_json::json!({"update_id": 44, "edited_message": {}});
        let events = parse_update(body.to_string().as_bytes()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse_update(b"not json").is_err());
    }
}

//! Parsing of forwarded gateway dispatch envelopes (`{"t": ..., "d": ...}`)
//! into canonical events.

use gridkit_platforms::{InboundEvent, InboundMessage, InboundReaction, PlatformError};

pub fn parse_dispatch(body: &[u8]) -> Result<Vec<InboundEvent>, PlatformError> {
    let envelope: serde_json::Value = serde_json::from_slice(body)?;
    let kind = envelope.get("t").and_then(serde_json::Value::as_str);
    let Some(data) = envelope.get("d") else {
        return Ok(Vec::new());
    };

    let field = |name: &str| {
        data.get(name)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let events = match kind {
        Some("MESSAGE_CREATE") => {
            let author_id = data
                .get("author")
                .and_then(|a| a.get("id"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            vec![InboundEvent::ReceivedMessage(InboundMessage {
                provider_message_id: field("id"),
                provider_chat_id: field("channel_id"),
                provider_user_id: author_id,
                text: data
                    .get("content")
                    .and_then(serde_json::Value::as_str)
                    .map(String::from),
                raw: data.clone(),
            })]
        },
        Some("MESSAGE_REACTION_ADD" | "MESSAGE_REACTION_REMOVE") => {
            let emoji = data
                .get("emoji")
                .and_then(|e| e.get("name"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            let reaction = InboundReaction {
                provider_message_id: field("message_id"),
                provider_user_id: field("user_id"),
                emoji,
            };
            if kind == Some("MESSAGE_REACTION_ADD") {
                vec![InboundEvent::ReactionAdded(reaction)]
            } else {
                vec![InboundEvent::ReactionRemoved(reaction)]
            }
        },
        _ => Vec::new(),
    };
    Ok(events)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_create_parses() {
        let body = serde_json::json!({
            "t": "MESSAGE_CREATE",
            "d": {
                "id": "111",
                "channel_id": "222",
                "author": {"id": "333"},
                "content": "hello"
            }
        });
        let events = parse_dispatch(body.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 1);
        let InboundEvent::ReceivedMessage(message) = &events[0] else {
            panic!("expected message");
        };
        assert_eq!(message.provider_chat_id, "222");
        assert_eq!(message.provider_user_id, "333");
    }

    #[test]
    fn reaction_add_and_remove_parse() {
        for (kind, added) in [("MESSAGE_REACTION_ADD", true), ("MESSAGE_REACTION_REMOVE", false)] {
            let body = serde_json::json!({
                "t": kind,
                "d": {
                    "message_id": "111",
                    "user_id": "333",
                    "emoji": {"name": "👍"}
                }
            });
            let events = parse_dispatch(body.to_string().as_bytes()).unwrap();
            assert_eq!(events.len(), 1);
            match &events[0] {
                InboundEvent::ReactionAdded(r) => {
                    assert!(added);
                    assert_eq!(r.emoji, "👍");
                },
                InboundEvent::ReactionRemoved(r) => {
                    assert!(!added);
                    assert_eq!(r.emoji, "👍");
                },
                InboundEvent::ReceivedMessage(_) => panic!("unexpected message"),
            }
        }
    }

    #[test]
    fn unknown_dispatch_kind_yields_nothing() {
        let body = serde_json::json!({"t": "TYPING_START", "d": {}});
        assert!(parse_dispatch(body.to_string().as_bytes()).unwrap().is_empty());
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, Reaction, Role};

/// Events pushed to WebSocket clients. Serialized once per broadcast; every
/// connection subscribed to the channel receives the same bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// A message was posted to a channel. `mentions` is populated when the
    /// body contained resolvable `@name` tokens.
    Message { message: Message },

    ReactionAdd {
        channel_id: Uuid,
        reaction: Reaction,
        reactions: BTreeMap<String, u32>,
    },

    ReactionRemove {
        channel_id: Uuid,
        reaction: Reaction,
        reactions: BTreeMap<String, u32>,
    },

    MessagePinned { message: Message },

    MessageUnpinned { message: Message },

    /// A connection joined a channel. Carries the full recomputed presence
    /// list so clients never have to diff join/leave events.
    UserJoined {
        channel_id: Uuid,
        user_id: Uuid,
        user_name: String,
        user_role: Role,
        online_users: Vec<Uuid>,
    },

    UserLeft {
        channel_id: Uuid,
        user_id: Uuid,
        user_name: String,
        online_users: Vec<Uuid>,
    },
}

/// Commands sent FROM client TO server over the WebSocket.
/// Malformed or unknown frames are logged and dropped without closing the
/// connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GatewayCommand {
    /// Subscribe this connection to a channel's broadcasts.
    Join { channel_id: Uuid },

    /// Post a message to a channel through the full service pipeline.
    Message { channel_id: Uuid, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_flat_lowercase_tags() {
        let cmd: GatewayCommand = serde_json::from_str(
            r#"{"type":"join","channel_id":"00000000-0000-0000-0000-000000000007"}"#,
        )
        .unwrap();
        assert!(matches!(cmd, GatewayCommand::Join { .. }));

        let cmd: GatewayCommand = serde_json::from_str(
            r#"{"type":"message","channel_id":"00000000-0000-0000-0000-000000000007","body":"hi"}"#,
        )
        .unwrap();
        match cmd {
            GatewayCommand::Message { body, .. } => assert_eq!(body, "hi"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn event_tags_are_snake_case() {
        let event = GatewayEvent::UserLeft {
            channel_id: Uuid::nil(),
            user_id: Uuid::nil(),
            user_name: "alice".into(),
            online_users: vec![],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user_left");

        let event = GatewayEvent::ReactionAdd {
            channel_id: Uuid::nil(),
            reaction: Reaction {
                message_id: Uuid::nil(),
                user_id: Uuid::nil(),
                user_name: "bob".into(),
                emoji: "👍".into(),
            },
            reactions: BTreeMap::from([("👍".to_string(), 1)]),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "reaction_add");
        assert_eq!(json["reactions"]["👍"], 1);
    }
}

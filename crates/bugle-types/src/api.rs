use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Role;

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the WebSocket upgrade.
/// Canonical definition lives here in bugle-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub role: Role,
    pub exp: usize,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostMessageRequest {
    pub channel_id: Uuid,
    pub body: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostReplyRequest {
    pub channel_id: Uuid,
    pub body: String,
}

// -- Reactions --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionAction {
    Add,
    Remove,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub emoji: String,
    pub action: ReactionAction,
}

/// Result of a reaction add/remove: whether the row set changed and the
/// recomputed snapshot either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionUpdate {
    pub message_id: Uuid,
    pub emoji: String,
    pub changed: bool,
    pub reactions: BTreeMap<String, u32>,
}

// -- Moderation (admin surface) --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelModerationRequest {
    pub is_locked: Option<bool>,
    pub is_disabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MuteUserRequest {
    /// Absent means an indefinite mute.
    pub until: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

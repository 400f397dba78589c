use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform role. Administrators bypass channel-level sanctions
/// (lock/disable) but are still subject to user-level mutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    /// Lenient parse for values coming out of the database.
    /// Unknown strings fall back to the least-privileged role.
    pub fn from_db(s: &str) -> Role {
        match s {
            "admin" => Role::Admin,
            _ => Role::Member,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    General,
    Direct,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::General => "general",
            ChannelKind::Direct => "direct",
        }
    }

    pub fn from_db(s: &str) -> ChannelKind {
        match s {
            "direct" => ChannelKind::Direct,
            _ => ChannelKind::General,
        }
    }
}

/// User as the messaging core sees it: identity plus moderation state.
/// Account management lives outside this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub is_muted: bool,
    pub muted_until: Option<DateTime<Utc>>,
    pub mute_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Compact user reference embedded in messages, mentions and reaction groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub kind: ChannelKind,
    pub is_locked: bool,
    pub is_disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A chat message enriched for clients: author name, resolved mentions and
/// the denormalized emoji->count reaction snapshot.
///
/// `channel_id` and `author_id` never change after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub body: String,
    pub reply_to_id: Option<Uuid>,
    pub reactions: BTreeMap<String, u32>,
    pub is_pinned: bool,
    pub pinned_by: Option<Uuid>,
    pub pinned_at: Option<DateTime<Utc>>,
    pub mentions: Vec<UserSummary>,
    pub created_at: DateTime<Utc>,
}

/// A single reaction row as carried in broadcast payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub emoji: String,
}

/// Reactions on a message grouped by emoji for the REST read path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub users: Vec<UserSummary>,
}

//! Database row types — these map directly to SQLite rows.
//! Distinct from the bugle-types API models to keep the DB layer independent;
//! conversions into domain types live here so corrupt-field handling is in
//! one place.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use bugle_types::models::{Channel, ChannelKind, Role, User, UserSummary};

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub role: String,
    pub is_muted: bool,
    pub muted_until: Option<String>,
    pub mute_reason: Option<String>,
    pub created_at: String,
}

pub struct ChannelRow {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub is_locked: bool,
    pub is_disabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub author_name: String,
    pub body: String,
    pub reply_to_id: Option<String>,
    pub reactions: String,
    pub is_pinned: bool,
    pub pinned_by: Option<String>,
    pub pinned_at: Option<String>,
    pub created_at: String,
}

pub struct ReactionRow {
    pub id: String,
    pub message_id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_role: String,
    pub emoji: String,
    pub created_at: String,
}

/// Parse a TEXT uuid column, logging and falling back to the nil uuid on
/// corruption rather than failing the whole read.
pub fn parse_uuid(raw: &str, column: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", column, raw, e);
        Uuid::default()
    })
}

/// SQLite stores `datetime('now')` as \"YYYY-MM-DD HH:MM:SS\" without a
/// timezone, while values written from chrono are RFC 3339. Accept both.
pub fn parse_datetime(raw: &str, column: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}': {}", column, raw, e);
            DateTime::default()
        })
}

impl UserRow {
    pub fn into_user(self) -> User {
        User {
            id: parse_uuid(&self.id, "user id"),
            name: self.name,
            role: Role::from_db(&self.role),
            is_muted: self.is_muted,
            muted_until: self.muted_until.map(|t| parse_datetime(&t, "muted_until")),
            mute_reason: self.mute_reason,
            created_at: parse_datetime(&self.created_at, "user created_at"),
        }
    }

    pub fn into_summary(self) -> UserSummary {
        UserSummary {
            id: parse_uuid(&self.id, "user id"),
            name: self.name,
            role: Role::from_db(&self.role),
        }
    }
}

impl ChannelRow {
    pub fn into_channel(self) -> Channel {
        Channel {
            id: parse_uuid(&self.id, "channel id"),
            name: self.name,
            kind: ChannelKind::from_db(&self.kind),
            is_locked: self.is_locked,
            is_disabled: self.is_disabled,
            created_at: parse_datetime(&self.created_at, "channel created_at"),
            updated_at: parse_datetime(&self.updated_at, "channel updated_at"),
        }
    }
}

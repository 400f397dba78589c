use anyhow::{Result, anyhow, bail};
use rusqlite::Connection;

use crate::Database;
use crate::models::{ChannelRow, MessageRow, ReactionRow, UserRow};

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, name: &str, role: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, role) VALUES (?1, ?2, ?3)",
                (id, name, role),
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_name(&self, name: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "name", name))
    }

    pub fn set_mute(&self, id: &str, until: Option<&str>, reason: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_muted = 1, muted_until = ?2, mute_reason = ?3 WHERE id = ?1",
                rusqlite::params![id, until, reason],
            )?;
            if changed == 0 {
                bail!("User not found: {}", id);
            }
            Ok(())
        })
    }

    pub fn clear_mute(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET is_muted = 0, muted_until = NULL, mute_reason = NULL WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
    }

    // -- Channels --

    pub fn create_channel(&self, id: &str, name: &str, kind: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channels (id, name, kind) VALUES (?1, ?2, ?3)",
                (id, name, kind),
            )?;
            Ok(())
        })
    }

    /// Create a DIRECT channel with its exactly-two memberships in one
    /// transaction. DIRECT channels never accept further members.
    pub fn create_direct_channel(
        &self,
        id: &str,
        name: &str,
        user_a: &str,
        user_b: &str,
    ) -> Result<()> {
        if user_a == user_b {
            bail!("direct channel requires two distinct users");
        }
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO channels (id, name, kind) VALUES (?1, ?2, 'direct')",
                (id, name),
            )?;
            tx.execute(
                "INSERT INTO memberships (channel_id, user_id) VALUES (?1, ?2)",
                (id, user_a),
            )?;
            tx.execute(
                "INSERT INTO memberships (channel_id, user_id) VALUES (?1, ?2)",
                (id, user_b),
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_channel(&self, id: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, kind, is_locked, is_disabled, created_at, updated_at
                 FROM channels WHERE id = ?1",
            )?;
            let row = stmt
                .query_row([id], |row| {
                    Ok(ChannelRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        kind: row.get(2)?,
                        is_locked: row.get(3)?,
                        is_disabled: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    pub fn set_channel_moderation(
        &self,
        id: &str,
        is_locked: Option<bool>,
        is_disabled: Option<bool>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE channels SET
                     is_locked   = COALESCE(?2, is_locked),
                     is_disabled = COALESCE(?3, is_disabled),
                     updated_at  = datetime('now')
                 WHERE id = ?1",
                rusqlite::params![id, is_locked, is_disabled],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Memberships --

    /// Insert a membership if absent. Returns true if newly created.
    /// DIRECT channels are sealed at creation and reject this.
    pub fn add_member(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let kind: String = conn
                .query_row("SELECT kind FROM channels WHERE id = ?1", [channel_id], |row| {
                    row.get(0)
                })
                .map_err(|_| anyhow!("Channel not found: {}", channel_id))?;
            if kind == "direct" {
                bail!("direct channels cannot accept new members");
            }
            let changed = conn.execute(
                "INSERT OR IGNORE INTO memberships (channel_id, user_id) VALUES (?1, ?2)",
                (channel_id, user_id),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn is_member(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM memberships WHERE channel_id = ?1 AND user_id = ?2",
                (channel_id, user_id),
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        channel_id: &str,
        author_id: &str,
        body: &str,
        reply_to_id: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, channel_id, author_id, body, reply_to_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, channel_id, author_id, body, reply_to_id],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{MESSAGE_SELECT} WHERE m.id = ?1"))?;
            let row = stmt.query_row([id], map_message_row).optional()?;
            Ok(row)
        })
    }

    /// Latest `limit` messages of a channel, returned oldest-first.
    pub fn get_messages(&self, channel_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT} WHERE m.channel_id = ?1
                 ORDER BY m.created_at DESC, m.rowid DESC LIMIT ?2"
            ))?;
            let mut rows = stmt
                .query_map(rusqlite::params![channel_id, limit], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    pub fn update_reactions_snapshot(&self, message_id: &str, snapshot: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET reactions = ?2 WHERE id = ?1",
                (message_id, snapshot),
            )?;
            Ok(())
        })
    }

    pub fn set_pinned(&self, message_id: &str, pinned_by: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            match pinned_by {
                Some(user_id) => conn.execute(
                    "UPDATE messages SET is_pinned = 1, pinned_by = ?2, pinned_at = datetime('now')
                     WHERE id = ?1",
                    (message_id, user_id),
                )?,
                None => conn.execute(
                    "UPDATE messages SET is_pinned = 0, pinned_by = NULL, pinned_at = NULL
                     WHERE id = ?1",
                    [message_id],
                )?,
            };
            Ok(())
        })
    }

    // -- Reactions --

    /// Insert-if-absent on the (message, user, emoji) triple.
    /// Returns true if a row was actually inserted.
    pub fn add_reaction(
        &self,
        id: &str,
        message_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO reactions (id, message_id, user_id, emoji)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, message_id, user_id, emoji],
            )?;
            Ok(changed > 0)
        })
    }

    /// Delete-if-present. Returns true if a row was actually removed.
    pub fn remove_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                rusqlite::params![message_id, user_id, emoji],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn reaction_counts(&self, message_id: &str) -> Result<Vec<(String, u32)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT emoji, COUNT(*) FROM reactions WHERE message_id = ?1
                 GROUP BY emoji ORDER BY emoji",
            )?;
            let counts = stmt
                .query_map([message_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(counts)
        })
    }

    pub fn reactions_with_users(&self, message_id: &str) -> Result<Vec<ReactionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.message_id, r.user_id, u.name, u.role, r.emoji, r.created_at
                 FROM reactions r
                 LEFT JOIN users u ON r.user_id = u.id
                 WHERE r.message_id = ?1
                 ORDER BY r.emoji, r.rowid",
            )?;
            let rows = stmt
                .query_map([message_id], |row| {
                    Ok(ReactionRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        user_id: row.get(2)?,
                        user_name: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "unknown".to_string()),
                        user_role: row.get::<_, Option<String>>(4)?.unwrap_or_else(|| "member".to_string()),
                        emoji: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Mentions --

    /// Insert-if-absent on the (message, user) pair.
    /// Returns true if a row was actually inserted.
    pub fn insert_mention(&self, message_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO mentions (message_id, user_id) VALUES (?1, ?2)",
                (message_id, user_id),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn mentioned_users(&self, message_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.name, u.role, u.is_muted, u.muted_until, u.mute_reason, u.created_at
                 FROM mentions m
                 JOIN users u ON m.user_id = u.id
                 WHERE m.message_id = ?1
                 ORDER BY m.rowid",
            )?;
            let rows = stmt
                .query_map([message_id], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Pins --

    pub fn insert_pin(&self, channel_id: &str, message_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO pinned_messages (channel_id, message_id) VALUES (?1, ?2)",
                (channel_id, message_id),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_pin(&self, channel_id: &str, message_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM pinned_messages WHERE channel_id = ?1 AND message_id = ?2",
                (channel_id, message_id),
            )?;
            Ok(changed > 0)
        })
    }
}

const MESSAGE_SELECT: &str =
    "SELECT m.id, m.channel_id, m.author_id, u.name, m.body, m.reply_to_id, m.reactions,
            m.is_pinned, m.pinned_by, m.pinned_at, m.created_at
     FROM messages m
     LEFT JOIN users u ON m.author_id = u.id";

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        author_id: row.get(2)?,
        author_name: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "unknown".to_string()),
        body: row.get(4)?,
        reply_to_id: row.get(5)?,
        reactions: row.get(6)?,
        is_pinned: row.get(7)?,
        pinned_by: row.get(8)?,
        pinned_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        role: row.get(2)?,
        is_muted: row.get(3)?,
        muted_until: row.get(4)?,
        mute_reason: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, name, role, is_muted, muted_until, mute_reason, created_at
         FROM users WHERE {column} = ?1"
    ))?;
    let row = stmt.query_row([value], map_user_row).optional()?;
    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

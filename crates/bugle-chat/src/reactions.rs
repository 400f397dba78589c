use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use bugle_db::Database;
use bugle_db::models::parse_uuid;
use bugle_gateway::BroadcastDispatcher;
use bugle_types::api::{ReactionAction, ReactionUpdate};
use bugle_types::events::GatewayEvent;
use bugle_types::models::{Reaction, ReactionGroup, UserSummary};

use crate::error::ChatError;
use crate::moderation;

/// Maintains the normalized reaction rows and the per-message denormalized
/// emoji->count snapshot. The snapshot is recomputed from the rows on every
/// add/remove, so it can never drift.
#[derive(Clone)]
pub struct ReactionAggregator {
    db: Arc<Database>,
    dispatcher: BroadcastDispatcher,
}

impl ReactionAggregator {
    pub fn new(db: Arc<Database>, dispatcher: BroadcastDispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn add_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> Result<ReactionUpdate, ChatError> {
        self.apply(message_id, user_id, emoji, ReactionAction::Add)
    }

    pub fn remove_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> Result<ReactionUpdate, ChatError> {
        self.apply(message_id, user_id, emoji, ReactionAction::Remove)
    }

    fn apply(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
        action: ReactionAction,
    ) -> Result<ReactionUpdate, ChatError> {
        let message = self
            .db
            .get_message(&message_id.to_string())?
            .ok_or(ChatError::NotFound("message"))?;
        let channel_id = parse_uuid(&message.channel_id, "channel_id");

        if !self.db.is_member(&message.channel_id, &user_id.to_string())? {
            return Err(ChatError::AccessDenied);
        }

        let channel = self
            .db
            .get_channel(&message.channel_id)?
            .ok_or(ChatError::NotFound("channel"))?
            .into_channel();
        let user = self
            .db
            .get_user(&user_id.to_string())?
            .ok_or(ChatError::NotFound("user"))?
            .into_user();
        // Reacting in a locked or disabled channel is gated exactly like
        // posting.
        moderation::can_post(&self.db, &user, &channel)?;

        let changed = match action {
            ReactionAction::Add => self.db.add_reaction(
                &Uuid::new_v4().to_string(),
                &message_id.to_string(),
                &user_id.to_string(),
                emoji,
            )?,
            ReactionAction::Remove => {
                self.db
                    .remove_reaction(&message_id.to_string(), &user_id.to_string(), emoji)?
            }
        };

        let reactions = self.recompute_snapshot(message_id)?;

        if changed {
            debug!(
                "{} {:?} reaction {} on message {}",
                user.name, action, emoji, message_id
            );
            let reaction = Reaction {
                message_id,
                user_id,
                user_name: user.name,
                emoji: emoji.to_string(),
            };
            let event = match action {
                ReactionAction::Add => GatewayEvent::ReactionAdd {
                    channel_id,
                    reaction,
                    reactions: reactions.clone(),
                },
                ReactionAction::Remove => GatewayEvent::ReactionRemove {
                    channel_id,
                    reaction,
                    reactions: reactions.clone(),
                },
            };
            self.dispatcher.broadcast(channel_id, &event);
        }

        Ok(ReactionUpdate {
            message_id,
            emoji: emoji.to_string(),
            changed,
            reactions,
        })
    }

    fn recompute_snapshot(&self, message_id: Uuid) -> Result<BTreeMap<String, u32>, ChatError> {
        let snapshot: BTreeMap<String, u32> = self
            .db
            .reaction_counts(&message_id.to_string())?
            .into_iter()
            .collect();
        let json = serde_json::to_string(&snapshot).map_err(anyhow::Error::from)?;
        self.db.update_reactions_snapshot(&message_id.to_string(), &json)?;
        Ok(snapshot)
    }

    /// Reactions on a message grouped by emoji, membership-gated.
    pub fn grouped(
        &self,
        message_id: Uuid,
        requester_id: Uuid,
    ) -> Result<Vec<ReactionGroup>, ChatError> {
        let message = self
            .db
            .get_message(&message_id.to_string())?
            .ok_or(ChatError::NotFound("message"))?;
        if !self.db.is_member(&message.channel_id, &requester_id.to_string())? {
            return Err(ChatError::AccessDenied);
        }

        let mut groups: Vec<ReactionGroup> = Vec::new();
        for row in self.db.reactions_with_users(&message_id.to_string())? {
            let user = UserSummary {
                id: parse_uuid(&row.user_id, "user_id"),
                name: row.user_name,
                role: bugle_types::models::Role::from_db(&row.user_role),
            };
            match groups.iter_mut().find(|g| g.emoji == row.emoji) {
                Some(group) => {
                    group.count += 1;
                    group.users.push(user);
                }
                None => groups.push(ReactionGroup {
                    emoji: row.emoji,
                    count: 1,
                    users: vec![user],
                }),
            }
        }
        Ok(groups)
    }
}

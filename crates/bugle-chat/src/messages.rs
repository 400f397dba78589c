use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use bugle_db::Database;
use bugle_db::models::{MessageRow, parse_datetime, parse_uuid};
use bugle_gateway::BroadcastDispatcher;
use bugle_types::events::GatewayEvent;
use bugle_types::models::Message;

use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::{mentions, moderation};

/// Orchestrates message creation: membership gate, moderation gate, body
/// validation, persistence, mention resolution, broadcast. Broadcast comes
/// strictly after the persistence step; a failed write never notifies
/// anyone.
#[derive(Clone)]
pub struct MessageService {
    db: Arc<Database>,
    dispatcher: BroadcastDispatcher,
    config: ChatConfig,
}

impl MessageService {
    pub fn new(db: Arc<Database>, dispatcher: BroadcastDispatcher, config: ChatConfig) -> Self {
        Self {
            db,
            dispatcher,
            config,
        }
    }

    pub fn post_message(
        &self,
        channel_id: Uuid,
        author_id: Uuid,
        body: &str,
    ) -> Result<Message, ChatError> {
        self.post(channel_id, None, author_id, body)
    }

    /// Same pipeline as `post_message`, plus the reply-target check: the
    /// target must exist and live in the same channel.
    pub fn post_reply(
        &self,
        channel_id: Uuid,
        reply_to_id: Uuid,
        author_id: Uuid,
        body: &str,
    ) -> Result<Message, ChatError> {
        let target = self
            .db
            .get_message(&reply_to_id.to_string())?
            .ok_or_else(|| ChatError::InvalidInput("reply target does not exist".into()))?;
        if target.channel_id != channel_id.to_string() {
            return Err(ChatError::InvalidInput(
                "reply target is in a different channel".into(),
            ));
        }
        self.post(channel_id, Some(reply_to_id), author_id, body)
    }

    fn post(
        &self,
        channel_id: Uuid,
        reply_to_id: Option<Uuid>,
        author_id: Uuid,
        body: &str,
    ) -> Result<Message, ChatError> {
        let channel = self
            .db
            .get_channel(&channel_id.to_string())?
            .ok_or(ChatError::NotFound("channel"))?
            .into_channel();

        if !self.db.is_member(&channel_id.to_string(), &author_id.to_string())? {
            return Err(ChatError::AccessDenied);
        }

        // Moderation reads user and channel state fresh on every attempt;
        // nothing is cached across the request.
        let author = self
            .db
            .get_user(&author_id.to_string())?
            .ok_or(ChatError::NotFound("user"))?
            .into_user();
        moderation::can_post(&self.db, &author, &channel)?;

        let body = body.trim();
        if body.is_empty() {
            return Err(ChatError::InvalidInput("message body is empty".into()));
        }
        if body.chars().count() > self.config.max_message_len {
            return Err(ChatError::InvalidInput(format!(
                "message body exceeds {} characters",
                self.config.max_message_len
            )));
        }

        let message_id = Uuid::new_v4();
        self.db.insert_message(
            &message_id.to_string(),
            &channel_id.to_string(),
            &author_id.to_string(),
            body,
            reply_to_id.map(|id| id.to_string()).as_deref(),
        )?;

        mentions::resolve(&self.db, message_id, body)?;

        let message = self
            .load(message_id)?
            .ok_or(ChatError::NotFound("message"))?;
        debug!(
            "{} posted message {} to channel {}",
            author.name, message_id, channel_id
        );

        self.dispatcher.broadcast(
            channel_id,
            &GatewayEvent::Message {
                message: message.clone(),
            },
        );
        Ok(message)
    }

    /// Latest messages of a channel, oldest first. `limit` is clamped to
    /// 1..=100 and defaults to 50.
    pub fn list_messages(
        &self,
        channel_id: Uuid,
        requester_id: Uuid,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, ChatError> {
        self.db
            .get_channel(&channel_id.to_string())?
            .ok_or(ChatError::NotFound("channel"))?;
        if !self.db.is_member(&channel_id.to_string(), &requester_id.to_string())? {
            return Err(ChatError::AccessDenied);
        }

        let limit = limit.unwrap_or(50).clamp(1, 100);
        let rows = self.db.get_messages(&channel_id.to_string(), limit)?;
        rows.into_iter().map(|row| hydrate(&self.db, row)).collect()
    }

    pub(crate) fn load(&self, message_id: Uuid) -> Result<Option<Message>, ChatError> {
        match self.db.get_message(&message_id.to_string())? {
            Some(row) => Ok(Some(hydrate(&self.db, row)?)),
            None => Ok(None),
        }
    }
}

/// Turn a message row into the client-facing shape: parsed ids, reaction
/// snapshot and resolved mention list.
pub(crate) fn hydrate(db: &Database, row: MessageRow) -> Result<Message, ChatError> {
    let reactions: BTreeMap<String, u32> = serde_json::from_str(&row.reactions).unwrap_or_else(|e| {
        warn!("Corrupt reactions snapshot on message '{}': {}", row.id, e);
        BTreeMap::new()
    });
    let mentions = db
        .mentioned_users(&row.id)?
        .into_iter()
        .map(|u| u.into_summary())
        .collect();

    Ok(Message {
        id: parse_uuid(&row.id, "message id"),
        channel_id: parse_uuid(&row.channel_id, "channel_id"),
        author_id: parse_uuid(&row.author_id, "author_id"),
        author_name: row.author_name,
        body: row.body,
        reply_to_id: row.reply_to_id.map(|s| parse_uuid(&s, "reply_to_id")),
        reactions,
        is_pinned: row.is_pinned,
        pinned_by: row.pinned_by.map(|s| parse_uuid(&s, "pinned_by")),
        pinned_at: row.pinned_at.map(|t| parse_datetime(&t, "pinned_at")),
        mentions,
        created_at: parse_datetime(&row.created_at, "message created_at"),
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::testutil::fixture;

    use super::*;

    #[test]
    fn post_persists_and_broadcasts_to_channel_subscribers() {
        let fx = fixture();
        let mut in_channel = fx.listen(fx.channel);
        let mut elsewhere = fx.listen(fx.other_channel);

        let message = fx.messages().post_message(fx.channel, fx.alice, "hello").unwrap();
        assert_eq!(message.author_id, fx.alice);
        assert_eq!(message.author_name, "alice");
        assert_eq!(message.body, "hello");

        let frame = in_channel.try_recv().unwrap();
        let event: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(event["type"], "message");
        assert_eq!(event["message"]["body"], "hello");
        assert!(elsewhere.try_recv().is_err());

        let rows = fx.db.get_messages(&fx.channel.to_string(), 50).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn non_member_post_writes_nothing_and_stays_silent() {
        let fx = fixture();
        let mut rx = fx.listen(fx.channel);

        let err = fx.messages().post_message(fx.channel, fx.carol, "hi").unwrap_err();
        assert!(matches!(err, ChatError::AccessDenied));

        assert!(fx.db.get_messages(&fx.channel.to_string(), 50).unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn body_is_trimmed_and_length_checked() {
        let fx = fixture();
        let svc = fx.messages();

        assert!(matches!(
            svc.post_message(fx.channel, fx.alice, "   "),
            Err(ChatError::InvalidInput(_))
        ));

        let too_long = "x".repeat(2001);
        assert!(matches!(
            svc.post_message(fx.channel, fx.alice, &too_long),
            Err(ChatError::InvalidInput(_))
        ));

        let message = svc.post_message(fx.channel, fx.alice, "  ok  ").unwrap();
        assert_eq!(message.body, "ok");
    }

    #[test]
    fn expired_mute_clears_and_post_succeeds() {
        let fx = fixture();
        let yesterday = (Utc::now() - Duration::days(1)).to_rfc3339();
        fx.db
            .set_mute(&fx.alice.to_string(), Some(&yesterday), None)
            .unwrap();

        fx.messages().post_message(fx.channel, fx.alice, "back again").unwrap();

        let user = fx.db.get_user(&fx.alice.to_string()).unwrap().unwrap().into_user();
        assert!(!user.is_muted);
    }

    #[test]
    fn reply_must_target_same_channel() {
        let fx = fixture();
        let svc = fx.messages();
        let original = svc.post_message(fx.channel, fx.alice, "root").unwrap();

        // bob replies in-channel
        let reply = svc.post_reply(fx.channel, original.id, fx.bob, "re: root").unwrap();
        assert_eq!(reply.reply_to_id, Some(original.id));

        // same target from the other channel is rejected
        let err = svc
            .post_reply(fx.other_channel, original.id, fx.alice, "wrong place")
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));

        // and a missing target too
        let err = svc
            .post_reply(fx.channel, Uuid::new_v4(), fx.alice, "ghost")
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
    }

    #[test]
    fn mentions_enrich_the_broadcast_payload() {
        let fx = fixture();
        let mut rx = fx.listen(fx.channel);

        let message = fx
            .messages()
            .post_message(fx.channel, fx.alice, "hey @bob check this")
            .unwrap();
        assert_eq!(message.mentions.len(), 1);
        assert_eq!(message.mentions[0].id, fx.bob);

        let frame = rx.try_recv().unwrap();
        let event: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(event["message"]["mentions"][0]["name"], "bob");

        // Mention uniqueness is per-message: a later message mentioning bob
        // again gets its own row.
        let second = fx
            .messages()
            .post_message(fx.channel, fx.alice, "@bob once more")
            .unwrap();
        assert_eq!(second.mentions.len(), 1);
        assert_eq!(fx.db.mentioned_users(&second.id.to_string()).unwrap().len(), 1);
    }

    #[test]
    fn list_is_membership_gated_and_ascending() {
        let fx = fixture();
        let svc = fx.messages();
        for i in 0..3 {
            svc.post_message(fx.channel, fx.alice, &format!("m{i}")).unwrap();
        }

        let listed = svc.list_messages(fx.channel, fx.bob, None).unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].body, "m0");
        assert_eq!(listed[2].body, "m2");

        assert!(matches!(
            svc.list_messages(fx.channel, fx.carol, None),
            Err(ChatError::AccessDenied)
        ));

        // limit is clamped into 1..=100
        let one = svc.list_messages(fx.channel, fx.alice, Some(0)).unwrap();
        assert_eq!(one.len(), 1);
    }
}

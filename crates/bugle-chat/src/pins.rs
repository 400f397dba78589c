use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use bugle_db::Database;
use bugle_db::models::parse_uuid;
use bugle_gateway::BroadcastDispatcher;
use bugle_types::events::GatewayEvent;
use bugle_types::models::Message;

use crate::error::ChatError;
use crate::messages::hydrate;

/// Admin-only pinning. A message holds at most one active pin per channel;
/// re-pinning and unpinning an unpinned message are no-ops that return the
/// current state without broadcasting.
#[derive(Clone)]
pub struct PinService {
    db: Arc<Database>,
    dispatcher: BroadcastDispatcher,
}

impl PinService {
    pub fn new(db: Arc<Database>, dispatcher: BroadcastDispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn pin(&self, message_id: Uuid, actor_id: Uuid) -> Result<Message, ChatError> {
        let (channel_id, channel_key) = self.target(message_id, actor_id)?;

        let newly_pinned = self.db.insert_pin(&channel_key, &message_id.to_string())?;
        if newly_pinned {
            self.db
                .set_pinned(&message_id.to_string(), Some(&actor_id.to_string()))?;
        }

        let message = self.load(message_id)?;
        if newly_pinned {
            info!("message {} pinned in channel {}", message_id, channel_id);
            self.dispatcher.broadcast(
                channel_id,
                &GatewayEvent::MessagePinned {
                    message: message.clone(),
                },
            );
        }
        Ok(message)
    }

    pub fn unpin(&self, message_id: Uuid, actor_id: Uuid) -> Result<Message, ChatError> {
        let (channel_id, channel_key) = self.target(message_id, actor_id)?;

        let removed = self.db.delete_pin(&channel_key, &message_id.to_string())?;
        if removed {
            self.db.set_pinned(&message_id.to_string(), None)?;
        }

        let message = self.load(message_id)?;
        if removed {
            info!("message {} unpinned in channel {}", message_id, channel_id);
            self.dispatcher.broadcast(
                channel_id,
                &GatewayEvent::MessageUnpinned {
                    message: message.clone(),
                },
            );
        }
        Ok(message)
    }

    /// Shared admin + existence checks. Returns the channel id in both
    /// parsed and key form.
    fn target(&self, message_id: Uuid, actor_id: Uuid) -> Result<(Uuid, String), ChatError> {
        let actor = self
            .db
            .get_user(&actor_id.to_string())?
            .ok_or(ChatError::NotFound("user"))?
            .into_user();
        if !actor.role.is_admin() {
            return Err(ChatError::AccessDenied);
        }
        let row = self
            .db
            .get_message(&message_id.to_string())?
            .ok_or(ChatError::NotFound("message"))?;
        Ok((parse_uuid(&row.channel_id, "channel_id"), row.channel_id))
    }

    fn load(&self, message_id: Uuid) -> Result<Message, ChatError> {
        let row = self
            .db
            .get_message(&message_id.to_string())?
            .ok_or(ChatError::NotFound("message"))?;
        hydrate(&self.db, row)
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::fixture;

    use super::*;

    #[test]
    fn pinning_is_admin_only() {
        let fx = fixture();
        let message_id = fx.post(fx.alice, "pin me");
        assert!(matches!(
            fx.pins().pin(message_id, fx.alice),
            Err(ChatError::AccessDenied)
        ));
    }

    #[test]
    fn pin_sets_flags_and_broadcasts_once() {
        let fx = fixture();
        let message_id = fx.post(fx.alice, "pin me");
        let mut rx = fx.listen(fx.channel);
        let pins = fx.pins();

        let pinned = pins.pin(message_id, fx.admin).unwrap();
        assert!(pinned.is_pinned);
        assert_eq!(pinned.pinned_by, Some(fx.admin));
        assert!(pinned.pinned_at.is_some());
        assert!(rx.try_recv().unwrap().contains("message_pinned"));

        // re-pinning is a no-op: state unchanged, nothing broadcast
        let again = pins.pin(message_id, fx.admin).unwrap();
        assert!(again.is_pinned);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unpin_clears_flags_and_tolerates_unpinned_target() {
        let fx = fixture();
        let message_id = fx.post(fx.alice, "pin me");
        let pins = fx.pins();
        pins.pin(message_id, fx.admin).unwrap();

        let mut rx = fx.listen(fx.channel);
        let unpinned = pins.unpin(message_id, fx.admin).unwrap();
        assert!(!unpinned.is_pinned);
        assert_eq!(unpinned.pinned_by, None);
        assert!(rx.try_recv().unwrap().contains("message_unpinned"));

        let again = pins.unpin(message_id, fx.admin).unwrap();
        assert!(!again.is_pinned);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn pinning_a_missing_message_is_not_found() {
        let fx = fixture();
        assert!(matches!(
            fx.pins().pin(Uuid::new_v4(), fx.admin),
            Err(ChatError::NotFound("message"))
        ));
    }
}

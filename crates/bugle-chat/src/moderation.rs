use chrono::{DateTime, Utc};
use uuid::Uuid;

use bugle_db::Database;
use bugle_types::models::{Channel, User};

use crate::error::ChatError;

/// The single moderation gate for posting and reacting. Checked in order:
///
/// 1. Mute, a user-level sanction. An expired mute (`muted_until` in the
///    past) is cleared here as a side effect and the check continues.
///    Applies to administrators too.
/// 2. Disabled channel. Administrators bypass.
/// 3. Locked channel. Administrators bypass.
///
/// Mute comes first so a muted admin is still blocked even though they can
/// override the channel-level sanctions.
pub fn can_post(db: &Database, user: &User, channel: &Channel) -> Result<(), ChatError> {
    if user.is_muted {
        match user.muted_until {
            Some(until) if until <= Utc::now() => {
                db.clear_mute(&user.id.to_string())?;
            }
            _ => return Err(ChatError::UserMuted),
        }
    }

    if user.role.is_admin() {
        return Ok(());
    }
    if channel.is_disabled {
        return Err(ChatError::ChatDisabled {
            channel_id: channel.id,
        });
    }
    if channel.is_locked {
        return Err(ChatError::ChannelLocked {
            channel_id: channel.id,
        });
    }
    Ok(())
}

// -- Admin operations on moderation state --

pub fn mute_user(
    db: &Database,
    actor_id: Uuid,
    target_id: Uuid,
    until: Option<DateTime<Utc>>,
    reason: Option<&str>,
) -> Result<User, ChatError> {
    require_admin(db, actor_id)?;
    let target = target_id.to_string();
    db.get_user(&target)?.ok_or(ChatError::NotFound("user"))?;
    db.set_mute(&target, until.map(|t| t.to_rfc3339()).as_deref(), reason)?;
    let row = db.get_user(&target)?.ok_or(ChatError::NotFound("user"))?;
    Ok(row.into_user())
}

pub fn unmute_user(db: &Database, actor_id: Uuid, target_id: Uuid) -> Result<User, ChatError> {
    require_admin(db, actor_id)?;
    let target = target_id.to_string();
    db.get_user(&target)?.ok_or(ChatError::NotFound("user"))?;
    db.clear_mute(&target)?;
    let row = db.get_user(&target)?.ok_or(ChatError::NotFound("user"))?;
    Ok(row.into_user())
}

pub fn set_channel_moderation(
    db: &Database,
    actor_id: Uuid,
    channel_id: Uuid,
    is_locked: Option<bool>,
    is_disabled: Option<bool>,
) -> Result<Channel, ChatError> {
    require_admin(db, actor_id)?;
    let id = channel_id.to_string();
    if !db.set_channel_moderation(&id, is_locked, is_disabled)? {
        return Err(ChatError::NotFound("channel"));
    }
    let row = db.get_channel(&id)?.ok_or(ChatError::NotFound("channel"))?;
    Ok(row.into_channel())
}

fn require_admin(db: &Database, actor_id: Uuid) -> Result<(), ChatError> {
    let actor = db
        .get_user(&actor_id.to_string())?
        .ok_or(ChatError::NotFound("user"))?
        .into_user();
    if !actor.role.is_admin() {
        return Err(ChatError::AccessDenied);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::testutil::fixture;

    use super::*;

    #[test]
    fn muted_user_cannot_post() {
        let fx = fixture();
        fx.db
            .set_mute(&fx.alice.to_string(), None, Some("spam"))
            .unwrap();

        let user = fx.db.get_user(&fx.alice.to_string()).unwrap().unwrap().into_user();
        let channel = fx.db.get_channel(&fx.channel.to_string()).unwrap().unwrap().into_channel();
        assert!(matches!(
            can_post(&fx.db, &user, &channel),
            Err(ChatError::UserMuted)
        ));
    }

    #[test]
    fn expired_mute_is_cleared_lazily() {
        let fx = fixture();
        let yesterday = (Utc::now() - Duration::days(1)).to_rfc3339();
        fx.db
            .set_mute(&fx.alice.to_string(), Some(&yesterday), Some("cool off"))
            .unwrap();

        let user = fx.db.get_user(&fx.alice.to_string()).unwrap().unwrap().into_user();
        let channel = fx.db.get_channel(&fx.channel.to_string()).unwrap().unwrap().into_channel();
        can_post(&fx.db, &user, &channel).unwrap();

        let user = fx.db.get_user(&fx.alice.to_string()).unwrap().unwrap().into_user();
        assert!(!user.is_muted);
        assert!(user.muted_until.is_none());
    }

    #[test]
    fn admins_bypass_lock_and_disable_but_not_mute() {
        let fx = fixture();
        fx.db
            .set_channel_moderation(&fx.channel.to_string(), Some(true), Some(true))
            .unwrap();

        let admin = fx.db.get_user(&fx.admin.to_string()).unwrap().unwrap().into_user();
        let channel = fx.db.get_channel(&fx.channel.to_string()).unwrap().unwrap().into_channel();
        can_post(&fx.db, &admin, &channel).unwrap();

        fx.db.set_mute(&fx.admin.to_string(), None, None).unwrap();
        let admin = fx.db.get_user(&fx.admin.to_string()).unwrap().unwrap().into_user();
        assert!(matches!(
            can_post(&fx.db, &admin, &channel),
            Err(ChatError::UserMuted)
        ));
    }

    #[test]
    fn disable_is_checked_before_lock() {
        let fx = fixture();
        fx.db
            .set_channel_moderation(&fx.channel.to_string(), Some(true), Some(true))
            .unwrap();

        let user = fx.db.get_user(&fx.alice.to_string()).unwrap().unwrap().into_user();
        let channel = fx.db.get_channel(&fx.channel.to_string()).unwrap().unwrap().into_channel();
        assert!(matches!(
            can_post(&fx.db, &user, &channel),
            Err(ChatError::ChatDisabled { .. })
        ));
    }

    #[test]
    fn locked_channel_blocks_members() {
        let fx = fixture();
        fx.db
            .set_channel_moderation(&fx.channel.to_string(), Some(true), None)
            .unwrap();

        let user = fx.db.get_user(&fx.alice.to_string()).unwrap().unwrap().into_user();
        let channel = fx.db.get_channel(&fx.channel.to_string()).unwrap().unwrap().into_channel();
        assert!(matches!(
            can_post(&fx.db, &user, &channel),
            Err(ChatError::ChannelLocked { .. })
        ));
    }

    #[test]
    fn moderation_toggles_are_admin_only() {
        let fx = fixture();
        assert!(matches!(
            set_channel_moderation(&fx.db, fx.alice, fx.channel, Some(true), None),
            Err(ChatError::AccessDenied)
        ));
        let channel =
            set_channel_moderation(&fx.db, fx.admin, fx.channel, Some(true), None).unwrap();
        assert!(channel.is_locked);
        assert!(!channel.is_disabled);
    }

    #[test]
    fn mute_and_unmute_round_trip() {
        let fx = fixture();
        let until = Utc::now() + Duration::hours(2);
        let muted = mute_user(&fx.db, fx.admin, fx.alice, Some(until), Some("flooding")).unwrap();
        assert!(muted.is_muted);
        assert_eq!(muted.mute_reason.as_deref(), Some("flooding"));

        let cleared = unmute_user(&fx.db, fx.admin, fx.alice).unwrap();
        assert!(!cleared.is_muted);
    }
}

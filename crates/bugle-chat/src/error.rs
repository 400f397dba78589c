use thiserror::Error;
use uuid::Uuid;

/// Domain errors of the messaging core. The REST layer maps these onto
/// status codes and structured bodies; the socket layer logs and drops.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Requester holds no membership for the channel.
    #[error("not a member of this channel")]
    AccessDenied,

    /// User-level sanction; applies to admins too.
    #[error("User is muted")]
    UserMuted,

    /// Channel-level sanction; admins bypass.
    #[error("chat is disabled for channel {channel_id}")]
    ChatDisabled { channel_id: Uuid },

    /// Channel-level sanction; admins bypass.
    #[error("channel {channel_id} is locked")]
    ChannelLocked { channel_id: Uuid },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    InvalidInput(String),

    /// Persistence failure. Fail-closed: callers must not broadcast after
    /// seeing this.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

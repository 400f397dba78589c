pub mod admin;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod pins;
pub mod reactions;

use std::sync::Arc;

use anyhow::anyhow;
use tracing::error;

use bugle_chat::{ChatError, MessageService, PinService, ReactionAggregator};
use bugle_db::Database;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub messages: MessageService,
    pub reactions: ReactionAggregator,
    pub pins: PinService,
    pub jwt_secret: String,
}

/// Run a blocking service call off the async runtime and fold join errors
/// into the storage error class.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ChatError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::from(ChatError::Storage(anyhow!("task join error: {e}")))
        })?
        .map_err(ApiError::from)
}

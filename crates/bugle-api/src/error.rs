use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use bugle_chat::ChatError;

/// Maps the domain taxonomy onto status codes and the structured bodies
/// clients key their banners off.
pub struct ApiError(ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self.0 {
            ChatError::AccessDenied => (
                StatusCode::FORBIDDEN,
                json!({ "error": "ACCESS_DENIED" }),
            ),
            ChatError::UserMuted => (
                StatusCode::FORBIDDEN,
                json!({ "error": "User is muted" }),
            ),
            ChatError::ChatDisabled { channel_id } => (
                StatusCode::FORBIDDEN,
                json!({ "error": "CHAT_DISABLED", "channel_id": channel_id }),
            ),
            ChatError::ChannelLocked { channel_id } => (
                StatusCode::FORBIDDEN,
                json!({ "error": "CHANNEL_LOCKED", "channel_id": channel_id }),
            ),
            ChatError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                json!({ "error": "NOT_FOUND", "resource": resource }),
            ),
            ChatError::InvalidInput(detail) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "INVALID_INPUT", "detail": detail }),
            ),
            ChatError::Storage(e) => {
                error!("storage error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "INTERNAL" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

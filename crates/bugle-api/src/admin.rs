//! Admin-only moderation surface: channel lock/disable toggles and
//! time-boxed user mutes. The service layer enforces the admin gate.

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use bugle_chat::moderation;
use bugle_types::api::{ChannelModerationRequest, Claims, MuteUserRequest};

use crate::{AppState, error::ApiError, run_blocking};

pub async fn update_channel_moderation(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChannelModerationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let channel = run_blocking(move || {
        moderation::set_channel_moderation(&db, claims.sub, channel_id, req.is_locked, req.is_disabled)
    })
    .await?;
    Ok(Json(channel))
}

pub async fn mute_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MuteUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user = run_blocking(move || {
        moderation::mute_user(&db, claims.sub, user_id, req.until, req.reason.as_deref())
    })
    .await?;
    Ok(Json(user))
}

pub async fn unmute_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user = run_blocking(move || moderation::unmute_user(&db, claims.sub, user_id)).await?;
    Ok(Json(user))
}

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use bugle_types::api::{Claims, PostMessageRequest, PostReplyRequest};

use crate::{AppState, error::ApiError, run_blocking};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub limit: Option<u32>,
}

pub async fn post_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = state.messages.clone();
    let message =
        run_blocking(move || service.post_message(req.channel_id, claims.sub, &req.body)).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn post_reply(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PostReplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = state.messages.clone();
    let message = run_blocking(move || {
        service.post_reply(req.channel_id, message_id, claims.sub, &req.body)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let service = state.messages.clone();
    let messages =
        run_blocking(move || service.list_messages(channel_id, claims.sub, query.limit)).await?;
    Ok(Json(messages))
}

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use bugle_types::api::{Claims, ReactionAction, ToggleReactionRequest};

use crate::{AppState, error::ApiError, run_blocking};

pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let aggregator = state.reactions.clone();
    let update = run_blocking(move || match req.action {
        ReactionAction::Add => aggregator.add_reaction(message_id, claims.sub, &req.emoji),
        ReactionAction::Remove => aggregator.remove_reaction(message_id, claims.sub, &req.emoji),
    })
    .await?;
    Ok(Json(update))
}

pub async fn list_reactions(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let aggregator = state.reactions.clone();
    let groups = run_blocking(move || aggregator.grouped(message_id, claims.sub)).await?;
    Ok(Json(groups))
}

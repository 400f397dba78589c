use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use bugle_types::api::Claims;

use crate::{AppState, error::ApiError, run_blocking};

pub async fn pin_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let pins = state.pins.clone();
    let message = run_blocking(move || pins.pin(message_id, claims.sub)).await?;
    Ok(Json(message))
}

pub async fn unpin_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let pins = state.pins.clone();
    let message = run_blocking(move || pins.unpin(message_id, claims.sub)).await?;
    Ok(Json(message))
}

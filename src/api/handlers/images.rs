use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::response::{ApiError, AppJson};
use crate::storage::models::{ImageRecord, NewImage};
use crate::AppState;

pub async fn list_images(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ImageRecord>>, ApiError> {
    Ok(Json(state.metadata.list_images().await?))
}

pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ImageRecord>, ApiError> {
    state
        .metadata
        .get_image(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Image not found"))
}

pub async fn create_image(
    State(state): State<Arc<AppState>>,
    AppJson(mut req): AppJson<NewImage>,
) -> Result<(StatusCode, Json<ImageRecord>), ApiError> {
    let errors = req.validate();
    if !errors.is_empty() {
        return Err(ApiError::invalid("Invalid image data", errors));
    }

    req.file_path = state.object_store.normalize_path(&req.file_path);
    let image = state.metadata.create_image(req).await?;

    tracing::debug!(image_id = %image.id, "Registered image");
    Ok((StatusCode::CREATED, Json(image)))
}

pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.metadata.delete_image(&id).await? {
        return Err(ApiError::not_found("Image not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

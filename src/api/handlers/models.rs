use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::response::{ApiError, AppJson};
use crate::storage::models::{ModelRecord, NewModel};
use crate::AppState;

pub async fn list_models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ModelRecord>>, ApiError> {
    Ok(Json(state.metadata.list_models().await?))
}

pub async fn get_model(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ModelRecord>, ApiError> {
    state
        .metadata
        .get_model(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Model not found"))
}

/// Register a model whose bytes were already uploaded.
pub async fn create_model(
    State(state): State<Arc<AppState>>,
    AppJson(mut req): AppJson<NewModel>,
) -> Result<(StatusCode, Json<ModelRecord>), ApiError> {
    let errors = req.validate();
    if !errors.is_empty() {
        return Err(ApiError::invalid("Invalid model data", errors));
    }

    req.file_path = state.object_store.normalize_path(&req.file_path);
    let model = state.metadata.create_model(req).await?;

    tracing::debug!(model_id = %model.id, file_path = %model.file_path, "Registered model");
    Ok((StatusCode::CREATED, Json(model)))
}

/// Metadata only: the stored bytes are left in place.
pub async fn delete_model(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.metadata.delete_model(&id).await? {
        return Err(ApiError::not_found("Model not found"));
    }
    tracing::debug!(model_id = %id, "Deleted model");
    Ok(StatusCode::NO_CONTENT)
}

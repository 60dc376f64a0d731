use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::api::response::ApiError;
use crate::object_store::{ByteStream, ObjectStoreError, ObjectStream, StorageBackend};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    #[serde(rename = "uploadURL")]
    pub upload_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub file_path: String,
    pub message: String,
    pub file_size: u64,
}

/// Marker carried inside the io::Error that aborts an oversized body.
#[derive(Debug, thiserror::Error)]
#[error("request body exceeds {0} bytes")]
struct BodyTooLarge(u64);

// ============================================================================
// Handlers
// ============================================================================

/// Route: POST /api/objects/upload
pub async fn request_upload(
    State(state): State<Arc<AppState>>,
) -> Result<Json<UploadUrlResponse>, ApiError> {
    let destination = state.object_store.upload_destination().await?;
    tracing::debug!(object_id = %destination.object_id, "Issued upload destination");
    Ok(Json(UploadUrlResponse {
        upload_url: destination.url,
    }))
}

/// Route: PUT /api/upload/:objectId
///
/// Streams the raw request body into the active store.
pub async fn receive_upload(
    State(state): State<Arc<AppState>>,
    Path(object_id): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<UploadResponse>, ApiError> {
    let limit = state.config.max_upload_size;
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(too_large(limit));
    }

    let stored = state
        .object_store
        .put_stream(&object_id, limited(body, limit))
        .await
        .map_err(|e| {
            if exceeded_limit(&e) {
                too_large(limit)
            } else {
                e.into()
            }
        })?;

    tracing::info!(object_id = %object_id, size = stored.size, "Stored upload");
    Ok(Json(UploadResponse {
        success: true,
        file_path: stored.path,
        message: "File uploaded successfully".to_string(),
        file_size: stored.size,
    }))
}

/// Route: GET /api/files/:objectId
pub async fn serve_file(
    State(state): State<Arc<AppState>>,
    Path(object_id): Path<String>,
) -> Result<Response, ApiError> {
    let object = state
        .object_store
        .get_stream(&object_id)
        .await
        .map_err(read_error)?;
    Ok(stream_response(object, None))
}

/// Route: GET /objects/*path
pub async fn serve_private_object(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    require_cloud(&state)?;
    // A leading slash would name an absolute `/<bucket>/<object>` key
    if path.starts_with('/') {
        return Err(ApiError::not_found("File not found"));
    }
    let object = state
        .object_store
        .get_stream(&path)
        .await
        .map_err(read_error)?;
    Ok(stream_response(object, Some(&path)))
}

/// Route: GET /public-objects/*path
pub async fn serve_public_object(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    require_cloud(&state)?;
    let key = state
        .object_store
        .search_public(&path)
        .await
        .map_err(read_error)?
        .ok_or_else(|| ApiError::not_found("File not found"))?;
    let object = state
        .object_store
        .get_stream(&key)
        .await
        .map_err(read_error)?;
    Ok(stream_response(object, Some(&path)))
}

// ============================================================================
// Helpers
// ============================================================================

fn require_cloud(state: &AppState) -> Result<(), ApiError> {
    if state.object_store.backend() != StorageBackend::Gcs {
        return Err(ApiError::not_found("Cloud storage not configured"));
    }
    Ok(())
}

/// A key that can never name an object is just a missing file to a reader.
fn read_error(e: ObjectStoreError) -> ApiError {
    match e {
        ObjectStoreError::InvalidKey(_) => ApiError::not_found("File not found"),
        other => other.into(),
    }
}

fn too_large(limit: u64) -> ApiError {
    ApiError::payload_too_large(format!(
        "File exceeds maximum upload size of {limit} bytes"
    ))
}

/// Cut the body off once more than `limit` bytes have arrived.
fn limited(body: Body, limit: u64) -> ByteStream {
    let mut seen = 0u64;
    body.into_data_stream()
        .map_err(std::io::Error::other)
        .and_then(move |chunk| {
            seen += chunk.len() as u64;
            let result = if seen > limit {
                Err(std::io::Error::other(BodyTooLarge(limit)))
            } else {
                Ok(chunk)
            };
            futures::future::ready(result)
        })
        .boxed()
}

fn exceeded_limit(e: &ObjectStoreError) -> bool {
    let io = match e {
        ObjectStoreError::Io(io) => io,
        ObjectStoreError::WriteFailed { source, .. } => source,
        _ => return false,
    };
    io.get_ref().is_some_and(|inner| inner.is::<BodyTooLarge>())
}

/// Stream an object back. Named objects get a guessed content type;
/// opaque upload ids are served as octet-stream.
fn stream_response(object: ObjectStream, name: Option<&str>) -> Response {
    let content_type = name
        .and_then(|n| mime_guess::from_path(n).first())
        .map(|m| m.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let mut response = (StatusCode::OK, Body::from_stream(object.stream)).into_response();
    let headers = response.headers_mut();
    if let Ok(value) = content_type.parse() {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(size) = object.size {
        headers.insert(header::CONTENT_LENGTH, header::HeaderValue::from(size));
    }
    // Objects are immutable once uploaded
    headers.insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("public, max-age=3600"),
    );
    response
}

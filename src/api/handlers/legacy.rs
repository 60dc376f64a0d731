use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::Json;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::response::ApiError;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyUploadResponse {
    pub file_path: String,
}

/// Route: POST /upload
///
/// Single-request upload through the server: a multipart `file` field is
/// written to the active store under a timestamped key.
pub async fn legacy_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<LegacyUploadResponse>, ApiError> {
    let mut file: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

        if data.len() as u64 > state.config.max_upload_size {
            return Err(ApiError::payload_too_large(format!(
                "File exceeds maximum upload size of {} bytes",
                state.config.max_upload_size
            )));
        }
        file = Some((file_name, data));
    }

    let (file_name, data) = file.ok_or_else(|| ApiError::bad_request("No file uploaded."))?;
    let key = format!(
        "{}-{}",
        Utc::now().timestamp_millis(),
        sanitize_file_name(&file_name)
    );

    let stored = state.object_store.put(&key, data).await?;
    let public_url = state
        .config
        .storage
        .cloud
        .as_ref()
        .and_then(|c| c.public_url.as_deref());
    let file_path = match public_url {
        Some(base) => format!("{}/{key}", base.trim_end_matches('/')),
        None => stored.path,
    };

    tracing::info!(key = %key, size = stored.size, "Stored legacy upload");
    Ok(Json(LegacyUploadResponse { file_path }))
}

/// Reduce a client-supplied file name to a single safe path segment.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_names_to_one_segment() {
        assert_eq!(sanitize_file_name("robot arm.obj"), "robot_arm.obj");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\models\\chair.fbx"), "chair.fbx");
        assert_eq!(sanitize_file_name(".."), "upload");
        assert_eq!(sanitize_file_name("..hidden"), "hidden");
    }
}

//! Media upload route.
//!
//! Uploaded files are stored under the media root with UUID filenames and
//! served back via the static `/media` mount.

use std::path::Path as FsPath;

use axum::{
    Json, Router,
    extract::{Multipart, State},
    routing::post,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::UploadResponse;
use crate::api::server::AppState;

const ALLOWED_IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg", "image/gif"];
const ALLOWED_AUDIO_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/ogg",
    "audio/x-wav",
];

/// Create the media router. Registered with its full path so it can be
/// merged next to the nested admin routers.
pub fn router() -> Router<AppState> {
    Router::new().route("/admin/upload", post(upload_media))
}

/// Store an uploaded image or audio file.
#[utoipa::path(
    post,
    path = "/admin/upload",
    tag = "media",
    responses(
        (status = 200, description = "Stored file", body = UploadResponse),
        (status = 400, description = "Unsupported media", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn upload_media(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut kind: Option<String> = None;
    let mut file: Option<(String, String, axum::body::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("kind") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Unreadable kind field: {e}")))?;
                kind = Some(value);
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Unreadable file field: {e}")))?;
                file = Some((filename, content_type, data));
            }
            _ => {}
        }
    }

    let kind = kind.ok_or_else(|| ApiError::bad_request("Missing kind field"))?;
    if kind != "image" && kind != "audio" {
        return Err(ApiError::bad_request("kind must be image or audio"));
    }
    let (filename, content_type, data) =
        file.ok_or_else(|| ApiError::bad_request("Missing file field"))?;

    if kind == "image" && !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
        return Err(ApiError::bad_request("Unsupported image type"));
    }
    if kind == "audio" && !ALLOWED_AUDIO_TYPES.contains(&content_type.as_str()) {
        return Err(ApiError::bad_request("Unsupported audio type"));
    }

    let default_ext = if kind == "image" { ".jpg" } else { ".mp3" };
    let ext = FsPath::new(&filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_else(|| default_ext.to_string());

    let stored_name = format!("{}{}", uuid::Uuid::new_v4(), ext);
    let subdir = if kind == "image" { "images" } else { "audio" };
    let target_dir = state.settings.media_root.join(subdir);
    tokio::fs::create_dir_all(&target_dir)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create media directory: {e}")))?;
    tokio::fs::write(target_dir.join(&stored_name), &data)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to store upload: {e}")))?;

    Ok(Json(UploadResponse {
        url: format!("/media/{subdir}/{stored_name}"),
        filename: stored_name,
        content_type,
    }))
}

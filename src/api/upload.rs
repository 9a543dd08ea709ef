//! File upload endpoint.

use axum::{
    extract::{
        multipart::{Multipart, MultipartError},
        State,
    },
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::AppState;

/// Form field carrying the uploaded file.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub url: String,
    pub path: String,
}

/// POST /api/upload - Store the `file` field of a multipart form.
pub async fn upload_file(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let stored = state
            .blobs
            .put(file_name.as_deref(), content_type.as_deref(), &bytes)
            .await?;
        tracing::info!("Upload {} by {}", stored.path, user.identity.email);

        return Ok(Json(UploadResponse {
            success: true,
            url: stored.url,
            path: stored.path,
        }));
    }

    Err(AppError::BadRequest("No file provided".to_string()))
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::BadRequest(err.body_text())
    }
}

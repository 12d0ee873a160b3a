//! File API handlers.

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use convertino_core::{format::bare_extension, EngineOptions, FileSnapshot};

use super::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

/// Body of `PATCH /files/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateFileRequest {
    pub to: String,
}

/// Optional body of `POST /files/{id}/convert`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConvertRequest {
    /// Raster quality, 0-100.
    pub quality: Option<u8>,
    /// Audio bitrate in kbps.
    pub bitrate: Option<u32>,
}

impl ConvertRequest {
    fn parse(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let request: Self = serde_json::from_slice(body)
            .map_err(|e| ApiError::bad_request(format!("Invalid convert request: {}", e)))?;
        if request.quality.is_some_and(|q| q > 100) {
            return Err(ApiError::bad_request("quality must be 0-100"));
        }
        if request.bitrate == Some(0) {
            return Err(ApiError::bad_request("bitrate must be positive"));
        }
        Ok(request)
    }

    fn into_options(self) -> EngineOptions {
        EngineOptions {
            quality: self.quality,
            bitrate_kbps: self.bitrate,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Upload a file (multipart `file` and `to`).
pub async fn create_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut upload: Option<(String, Bytes)> = None;
    let mut to: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let part = field.name().map(str::to_string);
        match part.as_deref() {
            Some("file") => {
                let name = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|n| !n.trim().is_empty())
                    .ok_or_else(|| ApiError::bad_request("file part has no file name"))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
                upload = Some((name, bytes));
            }
            Some("to") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid 'to' field: {}", e)))?;
                to = Some(value);
            }
            other => debug!(field = ?other, "Ignoring multipart field"),
        }
    }

    let (name, bytes) = upload.ok_or_else(|| ApiError::bad_request("missing 'file' part"))?;
    let to = to
        .filter(|t| !bare_extension(t.trim()).is_empty())
        .ok_or_else(|| ApiError::bad_request("missing 'to' field"))?;

    let file = state
        .orchestrator()
        .submit(&name, bytes.to_vec(), to.trim())
        .await;
    Ok((StatusCode::CREATED, Json(file.snapshot())))
}

pub async fn list_files(State(state): State<Arc<AppState>>) -> Json<Vec<FileSnapshot>> {
    Json(state.orchestrator().list().await)
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FileSnapshot>, ApiError> {
    let file = state.orchestrator().get(&id).await?;
    Ok(Json(file.snapshot()))
}

/// Change the target format.
pub async fn update_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateFileRequest>,
) -> Result<Json<FileSnapshot>, ApiError> {
    if bare_extension(request.to.trim()).is_empty() {
        return Err(ApiError::bad_request("'to' cannot be empty"));
    }
    let snapshot = state.orchestrator().set_target(&id, request.to.trim()).await?;
    Ok(Json(snapshot))
}

/// Start a conversion in the background.
pub async fn convert_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let options = ConvertRequest::parse(&body)?.into_options();
    let orchestrator = state.orchestrator();
    orchestrator.start(&id, options).await?;
    let file = orchestrator.get(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(file.snapshot())))
}

pub async fn cancel_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FileSnapshot>, ApiError> {
    let orchestrator = state.orchestrator();
    orchestrator.cancel(&id).await?;
    Ok(Json(orchestrator.get(&id).await?.snapshot()))
}

/// Download the converted result.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (name, result) = state.orchestrator().download(&id).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_fallback(&name),
        urlencoding::encode(&name)
    );

    Ok((
        [
            (header::CONTENT_TYPE, content_type(&result.format).to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        result.bytes.to_vec(),
    ))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator().discard(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Helpers
// ============================================================================

/// Replaces characters that cannot appear in a quoted header parameter.
fn ascii_fallback(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_graphic() && c != '"' && c != '\\' || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn content_type(format: &str) -> &'static str {
    match bare_extension(format) {
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" | "jpe" | "jfif" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "ico" | "cur" => "image/x-icon",
        "tif" | "tiff" => "image/tiff",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" | "opus" => "audio/ogg",
        "m4a" | "aac" => "audio/mp4",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "html" => "text/html; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "json" => "application/json",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "odt" => "application/vnd.oasis.opendocument.text",
        "epub" => "application/epub+zip",
        "rtf" => "application/rtf",
        _ => "application/octet-stream",
    }
}

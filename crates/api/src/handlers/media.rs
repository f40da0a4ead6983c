//! Handlers for media requests and artifact retrieval.
//!
//! `POST /media` is the non-streaming counterpart of the WebSocket
//! endpoint: it resolves the request once and reports either the finished
//! artifacts or that a job is running. Clients poll by re-submitting or by
//! reading `/media/{fingerprint}/status`.

use std::path::Path as FsPath;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use mediaflow_core::artifacts::{ArtifactRef, ARCHIVE_FILE_NAME};
use mediaflow_core::error::CoreError;
use mediaflow_core::fingerprint::is_valid_fingerprint;
use mediaflow_core::request::{MediaRequest, MediaRequestParams};
use mediaflow_core::sanitize::{sanitize_filename, split_extension};
use mediaflow_core::types::Fingerprint;
use mediaflow_pipeline::Resolution;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;
use crate::ws::session::STATUS_NOT_FOUND;

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Outcome of a submitted request.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub status: &'static str,
    pub fingerprint: Fingerprint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<ArtifactRef>>,
}

/// Stored status of a fingerprint.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub fingerprint: Fingerprint,
    pub status: &'static str,
}

/// Artifacts stored for a fingerprint.
#[derive(Debug, Serialize)]
pub struct ArtifactListResponse {
    pub fingerprint: Fingerprint,
    pub artifacts: Vec<ArtifactRef>,
}

/// Query parameters for single-artifact retrieval.
#[derive(Debug, Default, Deserialize)]
pub struct FileQuery {
    pub index: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/media
///
/// Returns `200` with the artifacts when they already exist, `202` when a
/// job was started or is already running.
pub async fn submit(
    State(state): State<AppState>,
    Json(params): Json<MediaRequestParams>,
) -> AppResult<Response> {
    let request = MediaRequest::from_params(params, &state.config.default_format)?;

    let response = match state.orchestrator.resolve(&request).await {
        Resolution::Ready {
            fingerprint,
            artifacts,
        } => (
            StatusCode::OK,
            Json(DataResponse {
                data: SubmitResponse {
                    status: "completed",
                    fingerprint,
                    artifacts: Some(artifacts),
                },
            }),
        ),
        Resolution::Accepted {
            fingerprint,
            subscription,
        }
        | Resolution::Attached {
            fingerprint,
            subscription,
        } => {
            // Nobody listens on this registration.
            state
                .orchestrator
                .hub()
                .unregister(&subscription.handle)
                .await;
            (
                StatusCode::ACCEPTED,
                Json(DataResponse {
                    data: SubmitResponse {
                        status: "processing",
                        fingerprint,
                        artifacts: None,
                    },
                }),
            )
        }
    };

    Ok(response.into_response())
}

/// GET /api/v1/media/{fingerprint}/status
pub async fn get_status(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> AppResult<Json<DataResponse<StatusResponse>>> {
    ensure_fingerprint(&fingerprint)?;
    let status = state.orchestrator.status(&fingerprint).await?;

    Ok(Json(DataResponse {
        data: StatusResponse {
            status: status.map_or(STATUS_NOT_FOUND, |s| s.as_str()),
            fingerprint,
        },
    }))
}

/// GET /api/v1/media/{fingerprint}
pub async fn list_artifacts(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> AppResult<Json<DataResponse<ArtifactListResponse>>> {
    let artifacts = state.library().artifacts(&fingerprint).await?;

    Ok(Json(DataResponse {
        data: ArtifactListResponse {
            fingerprint,
            artifacts,
        },
    }))
}

/// GET /api/v1/media/{fingerprint}/file?index=N
///
/// Without `index` the fingerprint must hold exactly one artifact.
pub async fn get_file(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
    Query(query): Query<FileQuery>,
) -> AppResult<Response> {
    let index = query.index.as_deref().map(str::trim).filter(|i| !i.is_empty());
    let file = state.library().file(&fingerprint, index).await?;
    record_access(&state, &fingerprint).await;

    serve_file(&file.path, &file.artifact.filename).await
}

/// GET /api/v1/media/{fingerprint}/archive
///
/// Zip of every artifact, built on first request and cached.
pub async fn get_archive(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> AppResult<Response> {
    let path = state.library().archive(&fingerprint).await?;
    record_access(&state, &fingerprint).await;

    serve_file(&path, ARCHIVE_FILE_NAME).await
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ensure_fingerprint(fingerprint: &str) -> AppResult<()> {
    if is_valid_fingerprint(fingerprint) {
        Ok(())
    } else {
        Err(AppError::Core(CoreError::NotFound {
            entity: "Media",
            id: fingerprint.to_string(),
        }))
    }
}

async fn record_access(state: &AppState, fingerprint: &str) {
    if let Err(e) = state.library().touch(fingerprint).await {
        tracing::warn!(fingerprint, error = %e, "Failed to record access");
    }
}

/// Stream a file as an attachment named `download_name`.
async fn serve_file(path: &FsPath, download_name: &str) -> AppResult<Response> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let file_size = file
        .metadata()
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?
        .len();

    let download_name = sanitize_filename(download_name);
    let disposition = format!("attachment; filename=\"{download_name}\"");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&download_name))
        .header(header::CONTENT_LENGTH, file_size.to_string())
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::InternalError(e.to_string()))
}

/// MIME type for a stored artifact.
fn content_type_for(filename: &str) -> &'static str {
    match split_extension(filename).1.map(str::to_ascii_lowercase).as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("a.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("a.MKV"), "video/x-matroska");
        assert_eq!(content_type_for("playlist.zip"), "application/zip");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}

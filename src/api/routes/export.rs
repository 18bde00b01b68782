//! Export handlers.

use super::options_from_body;
use crate::api::AppState;
use crate::error::{ApiError, Error};
use crate::types::ExportOptions;
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::path::Path;

/// POST /export - Build the spreadsheet (and optional archive) from the current job
#[utoipa::path(
    post,
    path = "/api/v1/export",
    tag = "export",
    request_body(content = ExportOptions, description = "Export options (defaults when omitted)", content_type = "application/json"),
    responses(
        (status = 200, description = "Export written", body = crate::types::ExportArtifact),
        (status = 404, description = "No run has been started", body = ApiError),
        (status = 409, description = "The run has not reached a terminal state", body = ApiError),
        (status = 422, description = "No record was retrieved successfully", body = ApiError),
        (status = 500, description = "Reading records or writing the artifact failed", body = ApiError)
    )
)]
pub async fn run_export(State(state): State<AppState>, body: Bytes) -> Response {
    let options: ExportOptions = match options_from_body(&body) {
        Ok(options) => options,
        Err(e) => return e.into_response(),
    };

    match state.retriever.export(options).await {
        Ok(artifact) => Json(artifact).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /export/download - Download the exported spreadsheet
#[utoipa::path(
    get,
    path = "/api/v1/export/download",
    tag = "export",
    responses(
        (status = 200, description = "Spreadsheet (text/csv)", content_type = "text/csv"),
        (status = 404, description = "Nothing has been exported yet", body = ApiError)
    )
)]
pub async fn download_spreadsheet(State(state): State<AppState>) -> Response {
    serve_file(&state.retriever.spreadsheet_path(), "text/csv; charset=utf-8", "spreadsheet").await
}

/// GET /export/archive - Download the ZIP archive of raw records
#[utoipa::path(
    get,
    path = "/api/v1/export/archive",
    tag = "export",
    responses(
        (status = 200, description = "ZIP archive (application/zip)", content_type = "application/zip"),
        (status = 404, description = "No archive has been exported yet", body = ApiError)
    )
)]
pub async fn download_archive(State(state): State<AppState>) -> Response {
    serve_file(&state.retriever.archive_path(), "application/zip", "archive").await
}

async fn serve_file(path: &Path, content_type: &'static str, what: &str) -> Response {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return (StatusCode::NOT_FOUND, Json(ApiError::not_found(what))).into_response();
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to read export artifact");
            return Error::Io(e).into_response();
        }
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| what.to_string());

    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response()
}

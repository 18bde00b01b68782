//! Retrieval run handlers.

use super::{ErrorsQuery, QueuedResponse, RetrievalStatusResponse, StopResponse, options_from_body};
use crate::api::AppState;
use crate::error::ApiError;
use crate::types::{JobStatus, RunOptions};
use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Page size when the client does not ask for one
const DEFAULT_ERRORS_LIMIT: usize = 100;

/// POST /retrieval - Upload an identifier table and start a run
#[utoipa::path(
    post,
    path = "/api/v1/retrieval",
    tag = "retrieval",
    request_body(content = Vec<u8>, description = "Identifier table in field 'file', optional RunOptions JSON in field 'options' (multipart/form-data)", content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "Run started", body = QueuedResponse),
        (status = 400, description = "Missing file or malformed table", body = ApiError),
        (status = 409, description = "A run is already in progress", body = ApiError),
        (status = 422, description = "No identifier column or no identifiers", body = ApiError),
        (status = 503, description = "Shutting down", body = ApiError)
    )
)]
pub async fn start_retrieval(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut table: Option<Bytes> = None;
    let mut options = RunOptions::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return ApiError::validation(format!("invalid multipart body: {}", e))
                    .into_response();
            }
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => match field.bytes().await {
                Ok(bytes) => table = Some(bytes),
                Err(e) => {
                    return ApiError::new("invalid_file", format!("failed to read file: {}", e))
                        .into_response();
                }
            },
            "options" => {
                let bytes = match field.bytes().await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        return ApiError::validation(format!("failed to read options: {}", e))
                            .into_response();
                    }
                };
                options = match options_from_body(&bytes) {
                    Ok(options) => options,
                    Err(e) => return e.into_response(),
                };
            }
            _ => {}
        }
    }

    let Some(table) = table else {
        return ApiError::new("missing_file", "no identifier table provided in 'file' field")
            .into_response();
    };

    match state
        .retriever
        .start_from_reader(&table[..], options)
        .await
    {
        Ok(queued) => (StatusCode::ACCEPTED, Json(QueuedResponse { queued })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /retrieval - Status and progress of the current run
#[utoipa::path(
    get,
    path = "/api/v1/retrieval",
    tag = "retrieval",
    responses(
        (status = 200, description = "Current run (status idle before the first run)", body = RetrievalStatusResponse)
    )
)]
pub async fn get_retrieval(State(state): State<AppState>) -> impl IntoResponse {
    let export_available = state.retriever.export_available().await;

    let response = match state.retriever.job().await {
        Some(job) => RetrievalStatusResponse {
            status: job.status(),
            total: job.total(),
            processed: job.cursor(),
            successes: job.success_count(),
            failures: job.failure_count(),
            progress: job.snapshot(),
            started_at: job.started_at(),
            finished_at: job.finished_at(),
            export_available,
        },
        None => RetrievalStatusResponse {
            status: JobStatus::Idle,
            total: 0,
            processed: 0,
            successes: 0,
            failures: 0,
            progress: None,
            started_at: None,
            finished_at: None,
            export_available,
        },
    };

    Json(response)
}

/// POST /retrieval/stop - Stop the running job before its next item
#[utoipa::path(
    post,
    path = "/api/v1/retrieval/stop",
    tag = "retrieval",
    responses(
        (status = 202, description = "Stop requested (a terminal job is left as is)", body = StopResponse),
        (status = 404, description = "No run has been started", body = ApiError)
    )
)]
pub async fn stop_retrieval(State(state): State<AppState>) -> Response {
    match state.retriever.stop().await {
        Ok(status) => (StatusCode::ACCEPTED, Json(StopResponse { status })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /retrieval/retry-failed - Re-run failed records and holdings, keeping retrieved records
#[utoipa::path(
    post,
    path = "/api/v1/retrieval/retry-failed",
    tag = "retrieval",
    request_body(content = RunOptions, description = "Options for the retry run (defaults when omitted)", content_type = "application/json"),
    responses(
        (status = 202, description = "Retry run started, or nothing to retry when queued is 0", body = QueuedResponse),
        (status = 404, description = "No run has been started", body = ApiError),
        (status = 409, description = "The last run is still in progress", body = ApiError)
    )
)]
pub async fn retry_failed(State(state): State<AppState>, body: Bytes) -> Response {
    let options: RunOptions = match options_from_body(&body) {
        Ok(options) => options,
        Err(e) => return e.into_response(),
    };

    match state.retriever.retry_failed(options).await {
        Ok(queued) => (StatusCode::ACCEPTED, Json(QueuedResponse { queued })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /retrieval/errors - Paged failure report of the current run
#[utoipa::path(
    get,
    path = "/api/v1/retrieval/errors",
    tag = "retrieval",
    params(ErrorsQuery),
    responses(
        (status = 200, description = "Failures in processing order", body = crate::retrieval::ErrorPage),
        (status = 404, description = "No run has been started", body = ApiError)
    )
)]
pub async fn list_errors(
    State(state): State<AppState>,
    Query(query): Query<ErrorsQuery>,
) -> Response {
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_ERRORS_LIMIT);

    match state.retriever.error_summary().await {
        Ok(summary) => Json(summary.page(offset, limit)).into_response(),
        Err(e) => e.into_response(),
    }
}

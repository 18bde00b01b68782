//! HTTP error responses
//!
//! Domain errors become a status code from [`ToHttpStatus`] and an [`ApiError`] JSON body.

use crate::error::{ApiError, Error, ToHttpStatus};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let api_error: ApiError = self.into();

        (status_code, Json(api_error)).into_response()
    }
}

/// Bare `ApiError`s are request validation failures
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExportError, InputError};
    use std::path::PathBuf;

    async fn body_of(response: Response) -> ApiError {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn job_running_is_a_conflict() {
        let response = Error::JobRunning.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_of(response).await.error.code, "job_running");
    }

    #[tokio::test]
    async fn missing_column_lists_the_headers_found() {
        let error = Error::Input(InputError::MissingColumn {
            expected: "OCLC Number".into(),
            found: vec!["Title".into(), "ISBN".into()],
        });
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let api_error = body_of(response).await;
        assert_eq!(api_error.error.code, "missing_column");
        let details = api_error.error.details.unwrap();
        assert_eq!(details["expected_column"], "OCLC Number");
        assert_eq!(details["found_columns"][1], "ISBN");
    }

    #[tokio::test]
    async fn export_failure_reports_successes_at_risk() {
        let error = Error::Export(ExportError::Io {
            path: PathBuf::from("/exports/ocn_records.csv"),
            reason: "disk full".into(),
            successes: 42,
        });
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let api_error = body_of(response).await;
        assert!(api_error.error.message.contains("disk full"));
        assert_eq!(api_error.error.details.unwrap()["successes_at_risk"], 42);
    }

    #[tokio::test]
    async fn bare_api_error_is_a_bad_request() {
        let response = ApiError::validation("no file").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_of(response).await.error.code, "validation_error");
    }
}

use super::*;
use crate::config::ExportConfig;
use crate::error::{ApiError, FetchError};
use crate::retrieval::ErrorPage;
use crate::retrieval::test_helpers::{ScriptedFetcher, storage_in};
use crate::types::{ExportArtifact, JobStatus};
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use routes::{QueuedResponse, RetrievalStatusResponse};
use serde::de::DeserializeOwned;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "bibrecord-test-boundary";

fn test_app(dir: &TempDir, fetcher: ScriptedFetcher) -> (Router, Arc<Retriever>) {
    let config = Config {
        storage: storage_in(dir),
        export: ExportConfig {
            export_dir: dir.path().join("exports"),
            ..ExportConfig::default()
        },
        ..Config::default()
    };
    let retriever = Arc::new(Retriever::new(config.clone(), Arc::new(fetcher)).unwrap());
    let app = create_router(retriever.clone(), Arc::new(config));
    (app, retriever)
}

fn upload(table: &str, options: Option<&str>) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"ids.csv\"\r\nContent-Type: text/csv\r\n\r\n{table}\r\n"
    );
    if let Some(options) = options {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"options\"\r\n\r\n{options}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    Request::builder()
        .method("POST")
        .uri("/retrieval")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body<T: DeserializeOwned>(response: Response) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn text_body(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn health_reports_ok_with_cors_headers() {
    let dir = TempDir::new().unwrap();
    let (app, _) = test_app(&dir, ScriptedFetcher::new());

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("access-control-allow-origin"));
    let body: serde_json::Value = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["job_status"], "idle");
}

#[tokio::test]
async fn retrieval_status_is_idle_before_the_first_run() {
    let dir = TempDir::new().unwrap();
    let (app, _) = test_app(&dir, ScriptedFetcher::new());

    let response = app.oneshot(get("/retrieval")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let status: RetrievalStatusResponse = json_body(response).await;
    assert_eq!(status.status, JobStatus::Idle);
    assert_eq!(status.total, 0);
    assert!(!status.export_available);
}

#[tokio::test]
async fn upload_run_and_export_end_to_end() {
    let dir = TempDir::new().unwrap();
    let fetcher = ScriptedFetcher::new().fail_record("3", FetchError::NotFound);
    let (app, retriever) = test_app(&dir, fetcher);

    let response = app
        .clone()
        .oneshot(upload(
            "OCLC Number;Title\n1;A\n2;B\n3;C\n",
            Some(r#"{"fetch_holdings": true}"#),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let queued: QueuedResponse = json_body(response).await;
    assert_eq!(queued.queued, 3);
    retriever.wait_for_completion().await;

    let status: RetrievalStatusResponse =
        json_body(app.clone().oneshot(get("/retrieval")).await.unwrap()).await;
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.processed, 3);
    assert_eq!(status.successes, 2);
    assert_eq!(status.failures, 1);
    assert!(status.export_available);
    assert!(status.progress.unwrap().is_final);

    let page: ErrorPage =
        json_body(app.clone().oneshot(get("/retrieval/errors")).await.unwrap()).await;
    assert_eq!(page.total, 1);
    assert_eq!(page.entries[0].identifier.as_str(), "3");

    let response = app.clone().oneshot(post("/export", "")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let artifact: ExportArtifact = json_body(response).await;
    assert_eq!(artifact.rows, 2);
    assert_eq!(artifact.rows_with_holdings, 2);

    let response = app.oneshot(get("/export/download")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv")
    );
    let csv = text_body(response).await;
    assert!(csv.starts_with("ocn"));
    assert_eq!(csv.lines().count(), 3);
}

#[tokio::test]
async fn upload_without_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (app, _) = test_app(&dir, ScriptedFetcher::new());

    let request = Request::builder()
        .method("POST")
        .uri("/retrieval")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(format!("--{BOUNDARY}--\r\n")))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.error.code, "missing_file");
}

#[tokio::test]
async fn upload_without_identifier_column_reports_headers() {
    let dir = TempDir::new().unwrap();
    let (app, _) = test_app(&dir, ScriptedFetcher::new());

    let response = app
        .oneshot(upload("Title;ISBN\nA;123\n", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.error.code, "missing_column");
    assert_eq!(error.error.details.unwrap()["found_columns"][0], "Title");
}

#[tokio::test]
async fn upload_with_bad_options_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (app, _) = test_app(&dir, ScriptedFetcher::new());

    let response = app
        .oneshot(upload("OCLC Number\n1\n", Some("{not json")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.error.code, "validation_error");
}

#[tokio::test]
async fn unreadable_options_part_does_not_start_a_run() {
    let dir = TempDir::new().unwrap();
    let (app, retriever) = test_app(&dir, ScriptedFetcher::new());

    // body ends inside the options part, without a closing boundary
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"ids.csv\"\r\n\r\nOCLC Number\n1\n\r\n--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"options\"\r\n\r\n{{\"fetch_holdings\": tr"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/retrieval")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.error.code, "validation_error");
    assert_eq!(retriever.status().await, JobStatus::Idle);
}

#[tokio::test]
async fn second_upload_while_running_conflicts() {
    let dir = TempDir::new().unwrap();
    let fetcher = ScriptedFetcher::new().with_delay(std::time::Duration::from_millis(50));
    let (app, retriever) = test_app(&dir, fetcher);

    let first = app
        .clone()
        .oneshot(upload("OCLC Number\n1\n2\n3\n4\n", None))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = app
        .clone()
        .oneshot(upload("OCLC Number\n5\n", None))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let stop = app.oneshot(post("/retrieval/stop", "")).await.unwrap();
    assert_eq!(stop.status(), StatusCode::ACCEPTED);
    retriever.wait_for_completion().await;
    assert_eq!(retriever.status().await, JobStatus::Stopped);
}

#[tokio::test]
async fn endpoints_needing_a_job_return_not_found() {
    let dir = TempDir::new().unwrap();
    let (app, _) = test_app(&dir, ScriptedFetcher::new());

    for request in [
        post("/retrieval/stop", ""),
        post("/retrieval/retry-failed", ""),
        get("/retrieval/errors"),
        post("/export", ""),
    ] {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error: ApiError = json_body(response).await;
        assert_eq!(error.error.code, "no_job");
    }
}

#[tokio::test]
async fn downloads_before_export_return_not_found() {
    let dir = TempDir::new().unwrap();
    let (app, _) = test_app(&dir, ScriptedFetcher::new());

    for uri in ["/export/download", "/export/archive"] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn retry_failed_keeps_retrieved_records() {
    let dir = TempDir::new().unwrap();
    let fetcher = ScriptedFetcher::new()
        .fail_record("2", FetchError::Timeout)
        .fail_record("4", FetchError::Timeout);
    let (app, retriever) = test_app(&dir, fetcher);

    app.clone()
        .oneshot(upload("OCLC Number\n1\n2\n3\n4\n", None))
        .await
        .unwrap();
    retriever.wait_for_completion().await;

    let response = app
        .clone()
        .oneshot(post("/retrieval/retry-failed", r#"{"skip_existing": true}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let queued: QueuedResponse = json_body(response).await;
    assert_eq!(queued.queued, 2);
    retriever.wait_for_completion().await;

    let status: RetrievalStatusResponse =
        json_body(app.oneshot(get("/retrieval")).await.unwrap()).await;
    assert_eq!(status.total, 4, "retrieved records are carried into the retry");
    assert_eq!(status.successes, 2);
    assert!(status.export_available);
}

#[tokio::test]
async fn export_of_a_running_job_conflicts() {
    let dir = TempDir::new().unwrap();
    let fetcher = ScriptedFetcher::new().with_delay(std::time::Duration::from_millis(50));
    let (app, retriever) = test_app(&dir, fetcher);

    app.clone()
        .oneshot(upload("OCLC Number\n1\n2\n3\n", None))
        .await
        .unwrap();
    let response = app.oneshot(post("/export", "")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    retriever.stop().await.unwrap();
    retriever.wait_for_completion().await;
}

#[tokio::test]
async fn event_stream_is_served_as_sse() {
    let dir = TempDir::new().unwrap();
    let (app, _) = test_app(&dir, ScriptedFetcher::new());

    let request = Request::builder()
        .uri("/events")
        .header("Accept", "text/event-stream")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.contains("text/event-stream"));
}

#[tokio::test]
async fn openapi_document_is_served() {
    let dir = TempDir::new().unwrap();
    let (app, _) = test_app(&dir, ScriptedFetcher::new());

    let response = app.oneshot(get("/openapi.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc: serde_json::Value = json_body(response).await;
    assert!(doc["paths"]["/api/v1/retrieval"].is_object());
}

#[test]
fn event_names_match_the_serde_tag() {
    use crate::types::Event;

    for event in [
        Event::RunAborted {
            error: "disk full".into(),
        },
        Event::ExportStarted { records: 1 },
        Event::Shutdown,
    ] {
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], routes::event_name(&event));
    }
}

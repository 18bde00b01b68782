//! REST API server module
//!
//! Exposes a [`Retriever`] over HTTP: upload an identifier table, watch progress,
//! stop or retry a run, page through failures and download the exported spreadsheet.

use crate::{Config, Result, Retriever};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Retrieval
/// - `POST /retrieval` - Upload an identifier table and start a run
/// - `GET /retrieval` - Status and progress of the current run
/// - `POST /retrieval/stop` - Stop the running job before its next item
/// - `POST /retrieval/retry-failed` - Re-run failures, keeping retrieved records
/// - `GET /retrieval/errors` - Paged failure report
///
/// ## Export
/// - `POST /export` - Build the spreadsheet (and optional archive)
/// - `GET /export/download` - Download the spreadsheet
/// - `GET /export/archive` - Download the ZIP archive
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive documentation (if enabled)
/// - `GET /events` - Server-sent events stream
pub fn create_router(retriever: Arc<Retriever>, config: Arc<Config>) -> Router {
    let state = AppState::new(retriever, config.clone());

    let router = Router::new()
        // Retrieval
        .route("/retrieval", post(routes::start_retrieval))
        .route("/retrieval", get(routes::get_retrieval))
        .route("/retrieval/stop", post(routes::stop_retrieval))
        .route("/retrieval/retry-failed", post(routes::retry_failed))
        .route("/retrieval/errors", get(routes::list_errors))
        // Export
        .route("/export", post(routes::run_export))
        .route("/export/download", get(routes::download_spreadsheet))
        .route("/export/archive", get(routes::download_archive))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    let router = if config.server.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router
        .layer(DefaultBodyLimit::max(config.server.api.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if config.server.api.cors_enabled {
        router.layer(build_cors_layer(&config.server.api.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer for the configured origins ("*" or an empty list allows any)
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address
///
/// Runs until the listener fails or the task is dropped.
///
/// # Example
///
/// ```no_run
/// use bibrecord_dl::{Config, Retriever};
/// use std::sync::Arc;
///
/// # async fn example() -> bibrecord_dl::Result<()> {
/// let config = Arc::new(Config::default());
/// let retriever = Arc::new(Retriever::with_worldcat((*config).clone())?);
///
/// bibrecord_dl::api::start_api_server(retriever, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(retriever: Arc<Retriever>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.server.api.bind_address;
    tracing::info!(address = %bind_address, "starting API server");

    let app = create_router(retriever, config);
    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

//! OpenAPI documentation and schema generation

use utoipa::OpenApi;

/// OpenAPI documentation for the bibrecord-dl REST API
///
/// Served at `/openapi.json` and, when enabled, browsable at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "bibrecord-dl REST API",
        version = "0.1.0",
        description = "Batch retrieval of WorldCat bibliographic records and holdings, with spreadsheet export",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790/api/v1", description = "Local development server")
    ),
    paths(
        // Retrieval
        crate::api::routes::start_retrieval,
        crate::api::routes::get_retrieval,
        crate::api::routes::stop_retrieval,
        crate::api::routes::retry_failed,
        crate::api::routes::list_errors,

        // Export
        crate::api::routes::run_export,
        crate::api::routes::download_spreadsheet,
        crate::api::routes::download_archive,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        crate::types::Identifier,
        crate::types::JobStatus,
        crate::types::FetchTarget,
        crate::types::ItemResult,
        crate::types::FetchOutcome,
        crate::types::Eta,
        crate::types::ProgressSnapshot,
        crate::types::RunOptions,
        crate::types::ExportOptions,
        crate::types::ExportArtifact,
        crate::types::HoldingsData,
        crate::types::InstitutionHoldings,
        crate::types::Event,

        crate::retrieval::ErrorEntry,
        crate::retrieval::ErrorPage,
        crate::retrieval::ErrorSummary,

        crate::api::routes::RetrievalStatusResponse,
        crate::api::routes::QueuedResponse,
        crate::api::routes::StopResponse,
        crate::api::routes::ErrorsQuery,

        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "retrieval", description = "Retrieval runs - Upload identifiers, monitor progress, stop and retry"),
        (name = "export", description = "Export - Merge retrieved records and holdings into a spreadsheet"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events"),
    )
)]
pub struct ApiDoc;

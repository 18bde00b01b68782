//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`retrieval`] - Starting, observing, stopping and retrying runs
//! - [`export`] - Spreadsheet and archive export
//! - [`system`] - Health, events, OpenAPI

use crate::types::{JobStatus, ProgressSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod export;
mod retrieval;
mod system;

pub use export::*;
pub use retrieval::*;
pub use system::*;

// ============================================================================
// Query/Request/Response Types (shared across handlers)
// ============================================================================

/// Query parameters for GET /retrieval/errors
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ErrorsQuery {
    /// Entries to skip (default: 0)
    pub offset: Option<usize>,
    /// Maximum entries to return (default: 100)
    pub limit: Option<usize>,
}

/// Response for GET /retrieval
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RetrievalStatusResponse {
    /// Status of the current job (`idle` before the first run)
    pub status: JobStatus,
    /// Identifiers in the batch
    pub total: usize,
    /// Identifiers processed so far
    pub processed: usize,
    /// Records retrieved
    pub successes: usize,
    /// Failed requests, record and holdings
    pub failures: usize,
    /// Latest progress snapshot
    pub progress: Option<ProgressSnapshot>,
    /// When the run started
    #[schema(value_type = Option<String>)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal state
    #[schema(value_type = Option<String>)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Whether POST /export would be accepted
    pub export_available: bool,
}

/// Response for POST /retrieval and POST /retrieval/retry-failed
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QueuedResponse {
    /// Identifiers queued for the new run
    pub queued: usize,
}

/// Response for POST /retrieval/stop
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct StopResponse {
    /// Job status when the stop was requested
    pub status: JobStatus,
}

/// Parse an optional JSON options body; an empty body means defaults
pub(crate) fn options_from_body<T>(body: &[u8]) -> Result<T, crate::error::ApiError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| crate::error::ApiError::validation(format!("invalid options: {}", e)))
}

//! Error types for bibrecord-dl
//!
//! Errors are split by how far they are allowed to travel:
//! - [`InputError`] is fatal to a run and surfaces before any item is processed
//! - [`FetchError`] is per-identifier data recorded in the outcome log, never propagated out of the loop
//! - [`ExportError`] is raised only after a job reached a terminal state
//!
//! The crate-level [`Error`] wraps all of them and maps onto HTTP status codes for the REST API.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for bibrecord-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bibrecord-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "storage.records_dir")
        key: Option<String>,
    },

    /// Identifier input could not be used
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// A single fetch failed (only surfaces outside the loop, e.g. in direct fetcher calls)
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Export failed or is blocked
    #[error("export error: {0}")]
    Export(#[from] ExportError),

    /// I/O error (cannot write to disk aborts a run)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A retrieval run is already active for this retriever
    #[error("a retrieval run is already in progress")]
    JobRunning,

    /// No retrieval run has been started yet
    #[error("no retrieval run has been started")]
    NoJob,

    /// Shutdown in progress - not accepting new runs
    #[error("shutdown in progress: not accepting new runs")]
    ShuttingDown,

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Problems with the uploaded identifier table
#[derive(Debug, Error)]
pub enum InputError {
    /// The header row has no recognized identifier column
    #[error("input must contain an '{expected}' column (found: {found:?})")]
    MissingColumn {
        /// The configured identifier column name
        expected: String,
        /// Header names that were present
        found: Vec<String>,
    },

    /// The table could not be read
    #[error("malformed input at line {line}: {reason}")]
    Malformed {
        /// 1-based line number, 0 when unknown
        line: u64,
        /// Why the row could not be read
        reason: String,
    },

    /// The table was readable but contained no identifiers
    #[error("input contains no identifiers")]
    Empty,
}

impl From<csv::Error> for InputError {
    fn from(e: csv::Error) -> Self {
        let line = e.position().map(|p| p.line()).unwrap_or(0);
        InputError::Malformed {
            line,
            reason: e.to_string(),
        }
    }
}

/// Failure of a single record or holdings request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The remote API has no record for this identifier
    #[error("not found")]
    NotFound,

    /// The remote API rejected the request because of rate limiting
    #[error("rate limited")]
    RateLimited,

    /// The remote API answered with an unexpected status
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body excerpt or reason phrase
        message: String,
    },

    /// Authentication against the token endpoint failed
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The request did not finish in time
    #[error("timeout")]
    Timeout,

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be interpreted
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// Export errors
#[derive(Debug, Error)]
pub enum ExportError {
    /// The job is still running (or never ran)
    #[error("export is not available while retrieval is {status}")]
    JobNotTerminal {
        /// Current job status
        status: String,
    },

    /// Nothing to export
    #[error("export blocked: no records were retrieved successfully")]
    NoSuccesses,

    /// A persisted record file could not be parsed
    #[error("failed to parse {path}: {reason} ({successes} retrieved records not exported)")]
    Parse {
        /// The file that failed to parse
        path: PathBuf,
        /// Parser message
        reason: String,
        /// Successes that will be lost if export is not retried
        successes: usize,
    },

    /// Reading persisted files or writing the artifact failed
    #[error("export I/O failed at {path}: {reason} ({successes} retrieved records not exported)")]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error message
        reason: String,
        /// Successes that will be lost if export is not retried
        successes: usize,
    },

    /// Building the ZIP archive failed
    #[error("failed to build archive {path}: {reason}")]
    Archive {
        /// Archive path
        path: PathBuf,
        /// Underlying error message
        reason: String,
    },
}

/// API error response format
///
/// ```json
/// {
///   "error": {
///     "code": "job_running",
///     "message": "a retrieval run is already in progress"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "missing_column", "export_blocked")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::Input(InputError::Malformed { .. }) => 400,
            Error::Input(_) => 422,

            Error::JobRunning => 409,
            Error::NoJob => 404,
            Error::Export(ExportError::JobNotTerminal { .. }) => 409,
            Error::Export(ExportError::NoSuccesses) => 422,
            Error::Export(_) => 500,

            Error::Fetch(FetchError::NotFound) => 404,
            Error::Fetch(FetchError::RateLimited) => 429,
            Error::Fetch(_) => 502,
            Error::Network(_) => 502,

            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Input(e) => match e {
                InputError::MissingColumn { .. } => "missing_column",
                InputError::Malformed { .. } => "malformed_input",
                InputError::Empty => "empty_input",
            },
            Error::Fetch(e) => match e {
                FetchError::NotFound => "record_not_found",
                FetchError::RateLimited => "rate_limited",
                FetchError::Auth(_) => "auth_failed",
                FetchError::Timeout => "timeout",
                _ => "fetch_error",
            },
            Error::Export(e) => match e {
                ExportError::JobNotTerminal { .. } => "job_not_terminal",
                ExportError::NoSuccesses => "export_blocked",
                ExportError::Parse { .. } => "export_parse_error",
                ExportError::Io { .. } => "export_io_error",
                ExportError::Archive { .. } => "archive_error",
            },
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::JobRunning => "job_running",
            Error::NoJob => "no_job",
            Error::ShuttingDown => "shutting_down",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            Error::Input(InputError::MissingColumn { expected, found }) => {
                Some(serde_json::json!({
                    "expected_column": expected,
                    "found_columns": found,
                }))
            }
            Error::Input(InputError::Malformed { line, .. }) => {
                Some(serde_json::json!({ "line": line }))
            }
            Error::Export(ExportError::Parse {
                path, successes, ..
            })
            | Error::Export(ExportError::Io {
                path, successes, ..
            }) => Some(serde_json::json!({
                "path": path,
                "successes_at_risk": successes,
            })),
            Error::Export(ExportError::Archive { path, .. }) => {
                Some(serde_json::json!({ "path": path }))
            }
            _ => None,
        };

        match details {
            Some(details) => ApiError::with_details(code, message, details),
            None => ApiError::new(code, message),
        }
    }
}

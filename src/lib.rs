//! # bibrecord-dl
//!
//! Batch retrieval of MARCXML bibliographic records and library holdings from the
//! WorldCat Metadata API, merged into one spreadsheet.
//!
//! The spreadsheet is written as CSV (`final_data.csv` by default), one row per
//! retrieved record with an `ocn` column first. Spreadsheet applications open it
//! directly; no `.xlsx` workbook is produced.
//!
//! ## Design Philosophy
//!
//! bibrecord-dl is designed to be:
//! - **Resumable** - Every record is written to disk as soon as it arrives
//! - **Cancellable** - A run stops between items and keeps what it retrieved
//! - **Library-first** - The REST API is an optional layer over the [`Retriever`]
//! - **Event-driven** - Consumers subscribe to events instead of polling
//!
//! ## Quick Start
//!
//! ```no_run
//! use bibrecord_dl::{Config, ExportOptions, Retriever, RunOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.worldcat.client_id = Some("client-id".to_string());
//!     config.worldcat.client_secret = Some("client-secret".to_string());
//!
//!     let retriever = Retriever::with_worldcat(config)?;
//!
//!     let mut events = retriever.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let table = std::fs::File::open("identifiers.csv")?;
//!     let options = RunOptions {
//!         fetch_holdings: true,
//!         ..Default::default()
//!     };
//!     retriever.start_from_reader(table, options).await?;
//!     retriever.wait_for_completion().await;
//!
//!     let artifact = retriever.export(ExportOptions::default()).await?;
//!     println!("{} rows written to {}", artifact.rows, artifact.spreadsheet.display());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Spreadsheet and archive export
pub mod export;
/// Record and holdings sources
pub mod fetcher;
/// Identifier table parsing
pub mod input;
/// Request pacing for the remote API
pub mod rate_limiter;
/// The batch retrieval loop
pub mod retrieval;
/// Orchestrator handle (decomposed into focused submodules)
pub mod retriever;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{
    ApiError, Error, ErrorDetail, ExportError, FetchError, InputError, Result, ToHttpStatus,
};
pub use export::Exporter;
pub use fetcher::{RecordFetcher, WorldCatFetcher};
pub use input::{parse_identifiers, parse_identifiers_from_path};
pub use retrieval::{BatchJob, ErrorSummary, RecordStore, RetrievalContext, run_batch};
pub use retriever::Retriever;
pub use types::{
    Eta, Event, ExportArtifact, ExportOptions, FetchOutcome, FetchTarget, HoldingsData,
    Identifier, InstitutionHoldings, ItemResult, JobStatus, ProgressSnapshot, RunOptions,
};

/// Run the retriever until a termination signal arrives, then shut it down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use bibrecord_dl::{Config, Retriever, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let retriever = Retriever::with_worldcat(Config::default())?;
///
///     run_with_shutdown(retriever).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(retriever: Retriever) -> Result<()> {
    wait_for_signal().await;
    retriever.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // registration can fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("received SIGINT");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("received SIGTERM");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C"),
        Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
    }
}

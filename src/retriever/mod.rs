//! The `Retriever` handle, split by concern:
//! - [`control`] - start, stop and retry-failed
//! - [`exports`] - export of the last terminal job
//! - [`lifecycle`] - shutdown

mod control;
mod exports;
mod lifecycle;


use crate::config::Config;
use crate::error::Result;
use crate::export::Exporter;
use crate::fetcher::{RecordFetcher, WorldCatFetcher};
use crate::retrieval::{BatchJob, ErrorSummary, RecordStore, RetrievalContext, SharedJob};
use crate::types::{Event, ExportArtifact, JobStatus, ProgressSnapshot};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Orchestrator owning the current batch job (cloneable, all state is shared)
///
/// At most one retrieval loop runs per retriever. Progress, the error summary and
/// export are available through the handle and lifecycle events through
/// [`subscribe`](Self::subscribe).
#[derive(Clone)]
pub struct Retriever {
    pub(crate) config: Arc<Config>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) ctx: RetrievalContext,
    pub(crate) exporter: Exporter,
    /// The most recent job, running or terminal
    pub(crate) current: Arc<RwLock<Option<SharedJob>>>,
    pub(crate) task: Arc<Mutex<Option<JoinHandle<()>>>>,
    pub(crate) last_export: Arc<RwLock<Option<ExportArtifact>>>,
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl Retriever {
    /// Create a retriever using `fetcher` for all remote calls
    ///
    /// # Errors
    /// Returns [`Error::Config`](crate::error::Error::Config) if the configuration is invalid.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bibrecord_dl::{Config, Retriever, RunOptions, WorldCatFetcher};
    /// use std::sync::Arc;
    ///
    /// # async fn example() -> bibrecord_dl::Result<()> {
    /// let config = Config::default();
    /// let fetcher = WorldCatFetcher::new(&config.worldcat, &config.retry)?;
    /// let retriever = Retriever::new(config, Arc::new(fetcher))?;
    ///
    /// let table = "OCLC Number\n12345\n67890\n";
    /// retriever.start_from_reader(table.as_bytes(), RunOptions::default()).await?;
    /// retriever.wait_for_completion().await;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: Config, fetcher: Arc<dyn RecordFetcher>) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(1000);
        let store = RecordStore::new(&config.storage);
        let ctx = RetrievalContext {
            fetcher,
            store: store.clone(),
            holdings_symbols: config.worldcat.holdings_symbols.clone(),
            progress: config.progress.clone(),
            event_tx: event_tx.clone(),
            cancel: CancellationToken::new(),
        };
        let exporter = Exporter::new(store, config.export.clone());

        Ok(Self {
            config: Arc::new(config),
            event_tx,
            ctx,
            exporter,
            current: Arc::new(RwLock::new(None)),
            task: Arc::new(Mutex::new(None)),
            last_export: Arc::new(RwLock::new(None)),
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Create a retriever talking to WorldCat with the configured credentials
    pub fn with_worldcat(config: Config) -> Result<Self> {
        let fetcher = WorldCatFetcher::new(&config.worldcat, &config.retry)?;
        Self::new(config, Arc::new(fetcher))
    }

    /// Subscribe to lifecycle events
    ///
    /// Slow subscribers may miss events (`RecvError::Lagged`); the job state stays
    /// available through [`progress`](Self::progress) and [`status`](Self::status).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The configuration this retriever was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Status of the current job, `Idle` before the first run
    pub async fn status(&self) -> JobStatus {
        match self.current_job().await {
            Some(job) => job.read().await.status(),
            None => JobStatus::Idle,
        }
    }

    /// Latest progress snapshot of the current job
    pub async fn progress(&self) -> Option<ProgressSnapshot> {
        let job = self.current_job().await?;
        let job = job.read().await;
        job.snapshot()
    }

    /// Copy of the current job
    pub async fn job(&self) -> Option<BatchJob> {
        let job = self.current_job().await?;
        let job = job.read().await;
        Some(job.clone())
    }

    /// Failure report of the current job so far
    ///
    /// # Errors
    /// Returns [`Error::NoJob`](crate::error::Error::NoJob) before the first run.
    pub async fn error_summary(&self) -> Result<ErrorSummary> {
        let job = self.require_job().await?;
        let job = job.read().await;
        Ok(job.error_summary())
    }

    /// Artifact of the most recent successful export
    pub async fn last_export(&self) -> Option<ExportArtifact> {
        self.last_export.read().await.clone()
    }

    pub(crate) async fn current_job(&self) -> Option<SharedJob> {
        self.current.read().await.clone()
    }

    pub(crate) async fn require_job(&self) -> Result<SharedJob> {
        self.current_job()
            .await
            .ok_or(crate::error::Error::NoJob)
    }

    pub(crate) fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("ctx", &self.ctx)
            .field("exporter", &self.exporter)
            .finish_non_exhaustive()
    }
}

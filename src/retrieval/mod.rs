//! Batch retrieval loop
//!
//! One run walks an ordered identifier list once, sequentially:
//! - [`storage`] - per-identifier files and atomic writes
//! - [`progress`] - debounced progress snapshots and ETA
//! - [`summary`] - failure report over the outcome log
//!
//! Per-item fetch failures are data: they land in the outcome log and the loop moves
//! on. Only failing to write to the storage directories aborts a run.

pub mod progress;
pub mod storage;
pub mod summary;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

pub use progress::{JobProgress, ProgressReporter, snapshot_at};
pub use storage::RecordStore;
pub use summary::{ErrorEntry, ErrorPage, ErrorSummary};

use crate::config::ProgressConfig;
use crate::error::Result;
use crate::fetcher::RecordFetcher;
use crate::types::{
    Event, FetchOutcome, FetchTarget, Identifier, ItemResult, JobStatus, ProgressSnapshot,
    RunOptions,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A batch job shared between the loop and its observers
pub type SharedJob = Arc<RwLock<BatchJob>>;

/// The unit of work for one run
///
/// Holds the ordered identifiers, how far the loop got, the outcome log and the
/// terminal status. The outcome log has one entry per processed identifier in
/// processing order, so after a completed run its length equals the batch size.
#[derive(Clone, Debug)]
pub struct BatchJob {
    identifiers: Vec<Identifier>,
    options: RunOptions,
    cursor: usize,
    outcomes: Vec<FetchOutcome>,
    failures: usize,
    status: JobStatus,
    cancel: CancellationToken,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    started: Option<Instant>,
    elapsed: Duration,
    secs_per_item: Option<f64>,
    /// Outcomes from the job this one retries, by identifier
    carried: HashMap<Identifier, FetchOutcome>,
}

impl BatchJob {
    /// A job that has not started; `cancel` stops it between items
    pub fn new(identifiers: Vec<Identifier>, options: RunOptions, cancel: CancellationToken) -> Self {
        Self {
            identifiers,
            options,
            cursor: 0,
            outcomes: Vec::new(),
            failures: 0,
            status: JobStatus::Idle,
            cancel,
            started_at: None,
            finished_at: None,
            started: None,
            elapsed: Duration::ZERO,
            secs_per_item: None,
            carried: HashMap::new(),
        }
    }

    /// A follow-up job over the identifiers `previous` processed or still carried
    ///
    /// Retrieved records are carried over without a new request. Identifiers whose
    /// record failed are fetched again; so are holdings that failed when `options`
    /// asks for holdings, reusing the record already on disk. Returns the job and
    /// the number of identifiers that need a request.
    pub fn retry_of(
        previous: &BatchJob,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> (Self, usize) {
        let pending = previous
            .outcomes
            .iter()
            .chain(previous.carried.values())
            .filter(|o| needs_retry(o, options))
            .count();
        // a stopped retry still owes the outcomes it had not reached yet
        let identifiers = previous.identifiers[..previous.cursor]
            .iter()
            .chain(
                previous.identifiers[previous.cursor..]
                    .iter()
                    .filter(|id| previous.carried.contains_key(*id)),
            )
            .cloned()
            .collect();

        let mut job = Self::new(identifiers, options, cancel);
        job.carried = previous
            .outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| (o.identifier.clone(), o.clone()))
            .chain(previous.carried.clone())
            .collect();
        (job, pending)
    }

    /// Identifiers in processing order
    pub fn identifiers(&self) -> &[Identifier] {
        &self.identifiers
    }

    /// Options the job runs with
    pub fn options(&self) -> RunOptions {
        self.options
    }

    /// Number of identifiers processed so far
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Identifiers in the batch
    pub fn total(&self) -> usize {
        self.identifiers.len()
    }

    /// Outcome log in processing order
    pub fn outcomes(&self) -> &[FetchOutcome] {
        &self.outcomes
    }

    /// Current status
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Identifiers whose record was retrieved
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Failed requests, record and holdings
    pub fn failure_count(&self) -> usize {
        self.failures
    }

    /// When the loop started, if it did
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// When the loop reached a terminal state
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Token that stops this job before its next item
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Request a stop; the item in flight still completes
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Failure report for the outcomes so far
    pub fn error_summary(&self) -> ErrorSummary {
        ErrorSummary::from_outcomes(&self.outcomes)
    }

    /// Loop state in the form the progress reporter consumes
    pub fn progress(&self) -> JobProgress {
        JobProgress {
            completed: self.cursor,
            total: self.identifiers.len(),
            failed: self.failures,
            elapsed: match (self.status, self.started) {
                (JobStatus::Running, Some(started)) => started.elapsed(),
                _ => self.elapsed,
            },
        }
    }

    /// Progress snapshot computed now; `None` before the job started
    pub fn snapshot(&self) -> Option<ProgressSnapshot> {
        self.started
            .map(|_| snapshot_at(&self.progress(), self.secs_per_item))
    }

    /// Mark the job running; no-op once started
    pub(crate) fn begin(&mut self) {
        if self.started.is_some() {
            return;
        }
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        self.started = Some(Instant::now());
    }

    fn record(&mut self, outcome: FetchOutcome) {
        self.failures += usize::from(!outcome.record.is_success());
        self.failures += usize::from(
            outcome
                .holdings
                .as_ref()
                .is_some_and(|h| !h.is_success()),
        );
        self.outcomes.push(outcome);
        self.cursor += 1;
    }

    fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
        if let Some(started) = self.started {
            self.elapsed = started.elapsed();
        }
    }
}

/// Collaborators a run needs
#[derive(Clone)]
pub struct RetrievalContext {
    /// Source of records and holdings
    pub fetcher: Arc<dyn RecordFetcher>,
    /// Where retrieved data is written
    pub store: RecordStore,
    /// Library symbols passed to holdings requests
    pub holdings_symbols: Vec<String>,
    /// Progress throttling and ETA smoothing
    pub progress: ProgressConfig,
    /// Lifecycle events
    pub event_tx: broadcast::Sender<Event>,
    /// Parent token; every job started from this context stops when it is cancelled
    pub cancel: CancellationToken,
}

impl RetrievalContext {
    fn emit(&self, event: Event) {
        // no subscribers is fine
        self.event_tx.send(event).ok();
    }
}

impl std::fmt::Debug for RetrievalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalContext")
            .field("store", &self.store)
            .field("holdings_symbols", &self.holdings_symbols)
            .finish_non_exhaustive()
    }
}

/// Run a batch to a terminal state and return the finished job
///
/// The job stops early when `ctx.cancel` is cancelled.
///
/// # Errors
/// Returns [`Error::Io`](crate::error::Error::Io) when the storage directories cannot be
/// created or written.
pub async fn run_batch(
    ctx: &RetrievalContext,
    identifiers: Vec<Identifier>,
    options: RunOptions,
) -> Result<BatchJob> {
    let job: SharedJob = Arc::new(RwLock::new(BatchJob::new(
        identifiers,
        options,
        ctx.cancel.child_token(),
    )));
    run_job(ctx, &job).await?;

    Ok(match Arc::try_unwrap(job) {
        Ok(lock) => lock.into_inner(),
        Err(shared) => shared.read().await.clone(),
    })
}

/// Drive a shared job to a terminal state
///
/// Observers can read the job while it runs; the lock is never held across a fetch.
/// On an I/O abort the job is left `Stopped` with the outcomes gathered so far.
pub async fn run_job(ctx: &RetrievalContext, job: &SharedJob) -> Result<()> {
    let (identifiers, options, cancel) = {
        let mut j = job.write().await;
        j.begin();
        (j.identifiers.clone(), j.options, j.cancel.clone())
    };
    let total = identifiers.len();

    if let Err(e) = ctx.store.ensure_dirs().await {
        return abort(ctx, job, e.into()).await;
    }

    info!(total, fetch_holdings = options.fetch_holdings, "retrieval started");
    ctx.emit(Event::RunStarted {
        total,
        fetch_holdings: options.fetch_holdings,
    });
    if let Some(initial) = job.read().await.snapshot() {
        ctx.emit(Event::Progress { snapshot: initial });
    }

    let mut reporter = ProgressReporter::new(ctx.progress.clone());
    for id in &identifiers {
        if cancel.is_cancelled() {
            break;
        }

        let carried = job.write().await.carried.remove(id);
        let outcome = match process_item(ctx, id, options, carried).await {
            Ok(outcome) => outcome,
            Err(e) => return abort(ctx, job, e).await,
        };

        let due = {
            let mut j = job.write().await;
            j.record(outcome);
            let progress = j.progress();
            let due = reporter.on_item_completed(&progress);
            j.secs_per_item = reporter.secs_per_item();
            due
        };
        if let Some(snapshot) = due {
            ctx.emit(Event::Progress { snapshot });
        }
    }

    let mut j = job.write().await;
    let successes = j.success_count();
    let failures = j.failure_count();
    if j.cursor < total {
        j.finish(JobStatus::Stopped);
        info!(completed = j.cursor, total, failures, "retrieval stopped");
        ctx.emit(Event::RunStopped {
            completed: j.cursor,
            total,
            failures,
        });
    } else {
        j.finish(JobStatus::Completed);
        info!(total, successes, failures, "retrieval completed");
        ctx.emit(Event::RunCompleted {
            total,
            successes,
            failures,
        });
    }
    Ok(())
}

async fn abort(ctx: &RetrievalContext, job: &SharedJob, e: crate::error::Error) -> Result<()> {
    error!(error = %e, "retrieval aborted");
    job.write().await.finish(JobStatus::Stopped);
    ctx.emit(Event::RunAborted {
        error: e.to_string(),
    });
    Err(e)
}

/// Whether a retry has to send a request for this outcome
fn needs_retry(outcome: &FetchOutcome, options: RunOptions) -> bool {
    !outcome.is_success()
        || (options.fetch_holdings
            && outcome.holdings.as_ref().is_some_and(|h| !h.is_success()))
}

/// Fetch and persist one identifier
///
/// A `carried` outcome from an earlier job is reused as far as it succeeded. Fetch
/// failures become outcome data; only write failures are returned as errors.
async fn process_item(
    ctx: &RetrievalContext,
    id: &Identifier,
    options: RunOptions,
    carried: Option<FetchOutcome>,
) -> Result<FetchOutcome> {
    if let Some(mut outcome) = carried {
        if let ItemResult::Success { reused, .. } = &mut outcome.record {
            *reused = true;
        }
        if needs_retry(&outcome, options) {
            let fresh = RunOptions {
                skip_existing: false,
                ..options
            };
            outcome.holdings = Some(fetch_holdings(ctx, id, fresh).await?);
        }
        return Ok(outcome);
    }

    let record = if options.skip_existing && ctx.store.record_exists(id).await {
        tracing::debug!(ocn = %id, "reusing existing record file");
        ItemResult::Success {
            path: ctx.store.record_path(id),
            reused: true,
        }
    } else {
        match ctx.fetcher.fetch_record(id).await {
            Ok(body) => ItemResult::Success {
                path: ctx.store.write_record(id, &body).await?,
                reused: false,
            },
            Err(e) => failure(ctx, id, FetchTarget::Record, &e),
        }
    };

    let holdings = if options.fetch_holdings && record.is_success() {
        Some(fetch_holdings(ctx, id, options).await?)
    } else {
        None
    };

    Ok(FetchOutcome {
        identifier: id.clone(),
        record,
        holdings,
    })
}

async fn fetch_holdings(
    ctx: &RetrievalContext,
    id: &Identifier,
    options: RunOptions,
) -> Result<ItemResult> {
    let path = ctx.store.holdings_path(id);
    if options.skip_existing && tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Ok(ItemResult::Success { path, reused: true });
    }

    Ok(
        match ctx.fetcher.fetch_holdings(id, &ctx.holdings_symbols).await {
            Ok(data) => ItemResult::Success {
                path: ctx.store.write_holdings(id, &data).await?,
                reused: false,
            },
            Err(e) => failure(ctx, id, FetchTarget::Holdings, &e),
        },
    )
}

fn failure(
    ctx: &RetrievalContext,
    id: &Identifier,
    target: FetchTarget,
    e: &crate::error::FetchError,
) -> ItemResult {
    warn!(ocn = %id, %target, error = %e, "fetch failed");
    let reason = e.to_string();
    ctx.emit(Event::ItemFailed {
        ocn: id.clone(),
        target,
        reason: reason.clone(),
    });
    ItemResult::Failure { reason }
}

//! Run control: start, stop, retry-failed.

use crate::error::{Error, InputError, Result};
use crate::input::parse_identifiers;
use crate::retrieval::{BatchJob, run_job};
use crate::types::{Identifier, JobStatus, RunOptions};
use std::io::Read;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::Retriever;

impl Retriever {
    /// Start a run over `identifiers` in the background
    ///
    /// The previous job, if terminal, is discarded.
    ///
    /// # Errors
    /// - [`Error::JobRunning`] if a run is already active
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown)
    /// - [`Error::Input`] if `identifiers` is empty
    pub async fn start(&self, identifiers: Vec<Identifier>, options: RunOptions) -> Result<()> {
        if identifiers.is_empty() {
            return Err(Error::Input(InputError::Empty));
        }
        let job = BatchJob::new(identifiers, options, self.ctx.cancel.child_token());
        self.launch(job).await
    }

    /// Install `job` as the current job and run it in the background
    async fn launch(&self, mut job: BatchJob) -> Result<()> {
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        // held until the new job is installed, so two starts cannot both pass the check
        let mut current = self.current.write().await;
        if let Some(job) = current.as_ref() {
            if !job.read().await.status().is_terminal() {
                return Err(Error::JobRunning);
            }
        }

        let total = job.total();
        let options = job.options();
        job.begin();
        let job = Arc::new(RwLock::new(job));
        *current = Some(job.clone());
        *self.last_export.write().await = None;

        let ctx = self.ctx.clone();
        let handle = tokio::spawn(async move {
            // failures are logged and emitted as RunAborted inside the loop
            let _ = run_job(&ctx, &job).await;
        });
        *self.task.lock().await = Some(handle);

        tracing::info!(total, ?options, "retrieval job started");
        Ok(())
    }

    /// Parse an identifier table and start a run over it
    ///
    /// Returns the number of identifiers queued.
    pub async fn start_from_reader<R: Read>(&self, reader: R, options: RunOptions) -> Result<usize> {
        let identifiers = parse_identifiers(reader, &self.config.input)?;
        let count = identifiers.len();
        self.start(identifiers, options).await?;
        Ok(count)
    }

    /// Ask the running job to stop before its next item
    ///
    /// Returns the job status at the time of the call; a terminal job is left as is.
    ///
    /// # Errors
    /// Returns [`Error::NoJob`] before the first run.
    pub async fn stop(&self) -> Result<JobStatus> {
        let job = self.require_job().await?;
        let job = job.read().await;
        if !job.status().is_terminal() {
            tracing::info!(completed = job.cursor(), total = job.total(), "stop requested");
            job.cancel();
        }
        Ok(job.status())
    }

    /// Re-run the failures of the last job
    ///
    /// The new job covers every identifier the last job processed. Records it
    /// retrieved are carried over, so an export afterwards still contains them.
    /// Failed records are fetched again, and so are failed holdings when
    /// `options.fetch_holdings` is set.
    ///
    /// Returns the number of identifiers that need a request; zero when nothing
    /// failed, in which case no run is started.
    ///
    /// # Errors
    /// - [`Error::NoJob`] before the first run
    /// - [`Error::JobRunning`] while the last job is still running
    pub async fn retry_failed(&self, options: RunOptions) -> Result<usize> {
        let (job, pending) = {
            let job = self.require_job().await?;
            let job = job.read().await;
            if !job.status().is_terminal() {
                return Err(Error::JobRunning);
            }
            BatchJob::retry_of(&job, options, self.ctx.cancel.child_token())
        };

        if pending == 0 {
            tracing::info!("no failures to retry");
            return Ok(0);
        }

        tracing::info!(pending, carried = job.total() - pending, "retrying failures");
        self.launch(job).await?;
        Ok(pending)
    }

    /// Wait until the background run (if any) has finished
    pub async fn wait_for_completion(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "retrieval task panicked");
            }
        }
    }
}

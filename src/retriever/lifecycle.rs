//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::Retriever;

/// How long shutdown waits for the item in flight
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl Retriever {
    /// Gracefully shut down the retriever
    ///
    /// 1. Stops accepting new runs
    /// 2. Cancels the running job (the item in flight completes and is recorded)
    /// 3. Waits for the loop to finish, up to 30 seconds
    /// 4. Emits [`Event::Shutdown`]
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("initiating graceful shutdown");
        self.accepting_new.store(false, Ordering::SeqCst);
        self.ctx.cancel.cancel();

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_completion()).await {
            Ok(()) => tracing::info!("retrieval loop finished"),
            Err(_) => tracing::warn!("timeout waiting for retrieval loop, proceeding with shutdown"),
        }

        self.emit(Event::Shutdown);
        tracing::info!("graceful shutdown complete");
        Ok(())
    }
}

//! Record fetcher boundary
//!
//! The retrieval loop only knows this trait. [`WorldCatFetcher`] is the production
//! implementation; tests and embedders can supply their own.

use crate::error::FetchError;
use crate::types::{HoldingsData, Identifier};
use async_trait::async_trait;

mod worldcat;

pub use worldcat::WorldCatFetcher;

/// Source of bibliographic records and holdings summaries
///
/// Implementations may time out single calls; a timeout is reported as
/// [`FetchError::Timeout`] and recorded as a failure for that identifier.
#[async_trait]
pub trait RecordFetcher: Send + Sync {
    /// Fetch the raw MARCXML record for one identifier
    async fn fetch_record(&self, id: &Identifier) -> Result<String, FetchError>;

    /// Fetch holdings for one identifier, filtered by the given library symbols
    ///
    /// Symbols are passed to the remote API unmodified. The result holds one entry
    /// per symbol, in the order given.
    async fn fetch_holdings(
        &self,
        id: &Identifier,
        symbols: &[String],
    ) -> Result<HoldingsData, FetchError>;
}

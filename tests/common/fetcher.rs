//! In-memory record source

use super::fixtures::marcxml;
use async_trait::async_trait;
use bibrecord_dl::{FetchError, HoldingsData, Identifier, InstitutionHoldings, RecordFetcher};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Serves generated records, failing the identifiers it was told to fail
#[derive(Default)]
pub struct MemoryFetcher {
    failing_records: HashSet<String>,
    failing_holdings: HashSet<String>,
    delay: Option<Duration>,
    record_calls: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record requests for these identifiers time out
    pub fn failing_records<I, S>(mut self, ocns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing_records.extend(ocns.into_iter().map(Into::into));
        self
    }

    /// Holdings requests for these identifiers are rate limited
    pub fn failing_holdings<I, S>(mut self, ocns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing_holdings.extend(ocns.into_iter().map(Into::into));
        self
    }

    /// Sleep before answering each record request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn record_calls(&self) -> usize {
        self.record_calls.load(Ordering::SeqCst)
    }

    /// Identifiers whose record request succeeded, in order
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordFetcher for MemoryFetcher {
    async fn fetch_record(&self, id: &Identifier) -> Result<String, FetchError> {
        self.record_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_records.contains(id.as_str()) {
            return Err(FetchError::Timeout);
        }
        self.fetched.lock().unwrap().push(id.to_string());
        Ok(marcxml(
            id.as_str(),
            &format!("Title {}", id),
            &["History", "Geography"],
        ))
    }

    async fn fetch_holdings(
        &self,
        id: &Identifier,
        symbols: &[String],
    ) -> Result<HoldingsData, FetchError> {
        if self.failing_holdings.contains(id.as_str()) {
            return Err(FetchError::RateLimited);
        }
        Ok(HoldingsData {
            ocn: id.to_string(),
            holdings: symbols
                .iter()
                .map(|symbol| InstitutionHoldings {
                    institution_symbol: symbol.clone(),
                    total_holding_count: 3,
                    total_shared_print_count: 1,
                    total_editions: 5,
                })
                .collect(),
        })
    }
}

//! Compact failure report for a batch

use crate::types::{FetchOutcome, FetchTarget, Identifier};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One failed request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorEntry {
    /// Identifier the request was for
    pub identifier: Identifier,
    /// Which request failed
    pub target: FetchTarget,
    /// Failure reason
    pub reason: String,
}

/// A window into the failure list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorPage {
    /// Index of the first entry in this page
    pub offset: usize,
    /// Total failures in the summary
    pub total: usize,
    /// Entries in this page
    pub entries: Vec<ErrorEntry>,
}

/// Failures of a batch in processing order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorSummary {
    entries: Vec<ErrorEntry>,
    record_failures: usize,
    holdings_failures: usize,
}

impl ErrorSummary {
    /// Collect failures from an outcome log
    ///
    /// A record failure and a holdings failure for the same identifier are separate
    /// entries, record first.
    pub fn from_outcomes(outcomes: &[FetchOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            if let Some(reason) = outcome.record.failure_reason() {
                summary.record_failures += 1;
                summary.entries.push(ErrorEntry {
                    identifier: outcome.identifier.clone(),
                    target: FetchTarget::Record,
                    reason: reason.to_string(),
                });
            }
            if let Some(reason) = outcome.holdings.as_ref().and_then(|h| h.failure_reason()) {
                summary.holdings_failures += 1;
                summary.entries.push(ErrorEntry {
                    identifier: outcome.identifier.clone(),
                    target: FetchTarget::Holdings,
                    reason: reason.to_string(),
                });
            }
        }
        summary
    }

    /// Number of failed requests
    pub fn failure_count(&self) -> usize {
        self.entries.len()
    }

    /// Failed record requests
    pub fn record_failure_count(&self) -> usize {
        self.record_failures
    }

    /// Failed holdings requests
    pub fn holdings_failure_count(&self) -> usize {
        self.holdings_failures
    }

    /// True when nothing failed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All failures in processing order
    pub fn entries(&self) -> impl Iterator<Item = &ErrorEntry> {
        self.entries.iter()
    }

    /// Identifiers whose record request failed, in processing order
    pub fn failed_records(&self) -> impl Iterator<Item = &Identifier> {
        self.entries
            .iter()
            .filter(|e| e.target == FetchTarget::Record)
            .map(|e| &e.identifier)
    }

    /// At most `limit` entries starting at `offset`
    pub fn page(&self, offset: usize, limit: usize) -> ErrorPage {
        ErrorPage {
            offset,
            total: self.entries.len(),
            entries: self.entries.iter().skip(offset).take(limit).cloned().collect(),
        }
    }
}

//! Core types for bibrecord-dl

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;
use utoipa::ToSchema;

/// Matches an OCLC number with its optional catalog prefixes and spreadsheet float suffix
#[allow(clippy::unwrap_used)]
static OCLC_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:\(ocolc\))?\s*(?:ocm|ocn|on)?\s*0*(\d+)(?:\.0+)?$").unwrap()
});

/// Normalized OCLC number
///
/// Always non-empty and made of ASCII digits without leading zeros, so the same record
/// written as `ocm00012345`, `(OCoLC)12345` or `12345.0` maps to one identifier and one
/// file on disk.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Normalize a raw cell value, returning `None` if it is not an OCLC number
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = OCLC_NUMBER.captures(raw.trim())?;
        let digits = caps.get(1)?.as_str();
        Some(Self(digits.to_string()))
    }

    /// The normalized number as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Identifier {
    type Err = crate::error::InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::error::InputError::Malformed {
            line: 0,
            reason: format!("'{}' is not an OCLC number", s),
        })
    }
}

/// Status of the retriever's current batch job
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// No run started yet
    #[default]
    Idle,
    /// The retrieval loop is processing identifiers
    Running,
    /// Cancelled before all identifiers were processed
    Stopped,
    /// Every identifier was processed
    Completed,
}

impl JobStatus {
    /// Whether the job reached a state in which it will not change any more
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Stopped | JobStatus::Completed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Idle => "idle",
            JobStatus::Running => "running",
            JobStatus::Stopped => "stopped",
            JobStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Which request an outcome or failure belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FetchTarget {
    /// The MARCXML bibliographic record
    Record,
    /// Holdings summary for the configured library symbols
    Holdings,
}

impl std::fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchTarget::Record => f.write_str("record"),
            FetchTarget::Holdings => f.write_str("holdings"),
        }
    }
}

/// Result of one request for one identifier
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ItemResult {
    /// Data was persisted at `path`
    Success {
        /// File holding the persisted data
        #[schema(value_type = String)]
        path: PathBuf,
        /// True when an existing file from an earlier run was kept instead of fetching
        #[serde(default)]
        reused: bool,
    },
    /// The request failed
    Failure {
        /// Free-text failure reason
        reason: String,
    },
}

impl ItemResult {
    /// Whether this result is a success
    pub fn is_success(&self) -> bool {
        matches!(self, ItemResult::Success { .. })
    }

    /// The failure reason, if any
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            ItemResult::Failure { reason } => Some(reason),
            ItemResult::Success { .. } => None,
        }
    }
}

/// Outcome for one processed identifier
///
/// Record and holdings are accounted independently: a holdings failure never turns a
/// record success into a failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FetchOutcome {
    /// The identifier this outcome belongs to
    pub identifier: Identifier,
    /// Raw record retrieval result
    pub record: ItemResult,
    /// Holdings retrieval result; `None` when holdings were not requested or the record failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holdings: Option<ItemResult>,
}

impl FetchOutcome {
    /// Whether the raw record was retrieved
    pub fn is_success(&self) -> bool {
        self.record.is_success()
    }

    /// Whether holdings data was retrieved for this identifier
    pub fn holdings_present(&self) -> bool {
        self.holdings.as_ref().is_some_and(ItemResult::is_success)
    }
}

/// Estimated time remaining
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Eta {
    /// Nothing completed yet, no rate to extrapolate from
    Unknown,
    /// Whole seconds left at the current rate
    Remaining {
        /// Seconds remaining
        seconds: u64,
    },
}

impl Eta {
    /// Remaining time as a duration, if known
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Eta::Unknown => None,
            Eta::Remaining { seconds } => Some(Duration::from_secs(*seconds)),
        }
    }
}

impl std::fmt::Display for Eta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eta::Unknown => f.write_str("unknown"),
            Eta::Remaining { seconds } => {
                let (h, rem) = (seconds / 3600, seconds % 3600);
                write!(f, "{:02}:{:02}:{:02}", h, rem / 60, rem % 60)
            }
        }
    }
}

/// Read-only view of batch progress
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProgressSnapshot {
    /// Identifiers processed so far
    pub completed: usize,
    /// Identifiers in the batch
    pub total: usize,
    /// Failures recorded so far (record and holdings)
    pub failed: usize,
    /// Completion percentage (0.0 to 100.0)
    pub percent: f32,
    /// Milliseconds since the run started
    pub elapsed_ms: u64,
    /// Estimated time remaining
    pub eta: Eta,
    /// True for the snapshot taken after the last item
    pub is_final: bool,
}

impl std::fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_final {
            write!(f, "100% • {}/{} • Done", self.completed, self.total)
        } else if self.completed == 0 {
            write!(f, "Starting… 0/{}", self.total)
        } else {
            write!(
                f,
                "{}% • {}/{} • ETA {}",
                self.percent as u32, self.completed, self.total, self.eta
            )
        }
    }
}

/// Options for one retrieval run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RunOptions {
    /// Also fetch holdings for every successfully retrieved record
    #[serde(default)]
    pub fetch_holdings: bool,
    /// Keep record files left by an earlier run instead of fetching them again
    #[serde(default)]
    pub skip_existing: bool,
}

/// Options for one export
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ExportOptions {
    /// Merge holdings columns into the spreadsheet when holdings files exist (default: true)
    #[serde(default = "default_true")]
    pub include_holdings: bool,
    /// Also write a ZIP archive of the raw MARCXML files (default: false)
    #[serde(default)]
    pub archive: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_holdings: true,
            archive: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Files produced by an export
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ExportArtifact {
    /// Merged spreadsheet
    #[schema(value_type = String)]
    pub spreadsheet: PathBuf,
    /// Record rows written (one per successfully retrieved identifier)
    pub rows: usize,
    /// Columns in the spreadsheet
    pub columns: usize,
    /// Rows that received holdings columns
    pub rows_with_holdings: usize,
    /// ZIP archive of raw records, when requested
    #[schema(value_type = Option<String>)]
    pub archive: Option<PathBuf>,
}

/// Holdings summary for one identifier across the requested library symbols
///
/// This is also the JSON layout of `{ocn}_holdings.json` files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HoldingsData {
    /// OCLC number the holdings belong to
    pub ocn: String,
    /// One entry per queried library symbol
    pub holdings: Vec<InstitutionHoldings>,
}

/// Holdings counts reported for one library symbol
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionHoldings {
    /// Library symbol the counts were filtered by
    pub institution_symbol: String,
    /// Number of holdings
    #[serde(default)]
    pub total_holding_count: u64,
    /// Number of shared print commitments
    #[serde(default)]
    pub total_shared_print_count: u64,
    /// Number of editions
    #[serde(default)]
    pub total_editions: u64,
}

/// Event emitted during the retrieval and export lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A run started
    RunStarted {
        /// Identifiers in the batch
        total: usize,
        /// Whether holdings are fetched as well
        fetch_holdings: bool,
    },

    /// Throttled progress update
    Progress {
        /// Current progress
        snapshot: ProgressSnapshot,
    },

    /// A record or holdings request failed
    ItemFailed {
        /// Identifier that failed
        ocn: Identifier,
        /// Which request failed
        target: FetchTarget,
        /// Failure reason
        reason: String,
    },

    /// The run was cancelled
    RunStopped {
        /// Identifiers processed before the stop
        completed: usize,
        /// Identifiers in the batch
        total: usize,
        /// Failures recorded
        failures: usize,
    },

    /// The run processed every identifier
    RunCompleted {
        /// Identifiers in the batch
        total: usize,
        /// Records retrieved
        successes: usize,
        /// Failures recorded
        failures: usize,
    },

    /// The run aborted on an unrecoverable error
    RunAborted {
        /// Error message
        error: String,
    },

    /// Export started
    ExportStarted {
        /// Records to export
        records: usize,
    },

    /// Export finished
    ExportComplete {
        /// Spreadsheet path
        #[schema(value_type = String)]
        spreadsheet: PathBuf,
        /// Rows written
        rows: usize,
    },

    /// Export failed
    ExportFailed {
        /// Error message
        error: String,
    },

    /// The retriever is shutting down
    Shutdown,
}

//! Configuration types for bibrecord-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};

/// Library symbols queried for holdings when none are configured
pub const DEFAULT_HOLDINGS_SYMBOLS: &[&str] = &[
    "QGE", "QGK", "NLTUD", "NETUE", "QGQ", "L2U", "NLMAA", "GRG", "GRU", "QHU", "QGJ", "VU@",
    "WURST",
];

/// Main configuration for [`Retriever`](crate::Retriever)
///
/// Every section has sensible defaults so `Config::default()` only needs WorldCat
/// credentials to talk to the real API.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where per-identifier files are written
    #[serde(default)]
    pub storage: StorageConfig,

    /// How identifier tables are read
    #[serde(default)]
    pub input: InputConfig,

    /// WorldCat Metadata API access
    #[serde(default)]
    pub worldcat: WorldCatConfig,

    /// Retry policy for transient API failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Progress snapshot throttling and ETA smoothing
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Spreadsheet and archive output
    #[serde(default)]
    pub export: ExportConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Load a configuration from a JSON file
    ///
    /// Missing sections fall back to their defaults. The result is validated before it
    /// is returned.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot express as types
    pub fn validate(&self) -> Result<()> {
        if self.input.identifier_column.trim().is_empty() {
            return Err(config_error(
                "identifier column name must not be empty",
                "input.identifier_column",
            ));
        }
        if !self.input.delimiter.is_ascii() {
            return Err(config_error(
                "delimiter must be a single ASCII character",
                "input.delimiter",
            ));
        }
        for (url, key) in [
            (&self.worldcat.token_url, "worldcat.token_url"),
            (&self.worldcat.metadata_url, "worldcat.metadata_url"),
        ] {
            if let Err(e) = url::Url::parse(url) {
                return Err(config_error(&format!("invalid URL '{}': {}", url, e), key));
            }
        }
        if self.worldcat.holdings_symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(config_error(
                "holdings symbols must not be blank",
                "worldcat.holdings_symbols",
            ));
        }
        if !(self.progress.eta_smoothing > 0.0 && self.progress.eta_smoothing <= 1.0) {
            return Err(config_error(
                "ETA smoothing factor must be in (0, 1]",
                "progress.eta_smoothing",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(config_error(
                "backoff multiplier must be at least 1.0",
                "retry.backoff_multiplier",
            ));
        }
        if self.export.spreadsheet_name.trim().is_empty() {
            return Err(config_error(
                "spreadsheet name must not be empty",
                "export.spreadsheet_name",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

/// On-disk layout shared between the retrieval loop and the export pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for raw MARCXML files, one `{ocn}.xml` per identifier (default: "OCNrecords/requested")
    #[serde(default = "default_records_dir")]
    pub records_dir: PathBuf,

    /// Directory for holdings files, one `{ocn}_holdings.json` per identifier
    /// (default: "OCNrecords/requested_holdings")
    #[serde(default = "default_holdings_dir")]
    pub holdings_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            records_dir: default_records_dir(),
            holdings_dir: default_holdings_dir(),
        }
    }
}

/// Identifier table parsing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputConfig {
    /// Header of the identifier column (default: "OCLC Number")
    #[serde(default = "default_identifier_column")]
    pub identifier_column: String,

    /// Additional header names accepted for the identifier column, compared case-insensitively
    #[serde(default = "default_column_aliases")]
    pub column_aliases: Vec<String>,

    /// Field delimiter (default: ';')
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            identifier_column: default_identifier_column(),
            column_aliases: default_column_aliases(),
            delimiter: default_delimiter(),
        }
    }
}

/// WorldCat Metadata API access
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldCatConfig {
    /// API key (OAuth client id)
    #[serde(default)]
    pub client_id: Option<String>,

    /// API secret (OAuth client secret)
    #[serde(default)]
    pub client_secret: Option<String>,

    /// OAuth scope (default: "WorldCatMetadataAPI")
    #[serde(default = "default_scope")]
    pub scope: String,

    /// OAuth token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Base URL of the Metadata API
    #[serde(default = "default_metadata_url")]
    pub metadata_url: String,

    /// Library symbols queried for holdings, passed to the fetcher unmodified
    #[serde(default = "default_holdings_symbols")]
    pub holdings_symbols: Vec<String>,

    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Maximum API requests per second (None = unlimited)
    #[serde(default)]
    pub requests_per_second: Option<u32>,
}

impl Default for WorldCatConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            scope: default_scope(),
            token_url: default_token_url(),
            metadata_url: default_metadata_url(),
            holdings_symbols: default_holdings_symbols(),
            request_timeout: default_request_timeout(),
            requests_per_second: None,
        }
    }
}

/// Retry configuration for transient API failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry in milliseconds (default: 100)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries in milliseconds (default: 10000)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,

    /// HTTP statuses treated as transient (default: 500, 502, 503, 504)
    #[serde(default = "default_retry_statuses")]
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
            retry_statuses: default_retry_statuses(),
        }
    }
}

/// Progress snapshot throttling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Minimum time between emitted snapshots in milliseconds (default: 250)
    #[serde(default = "default_min_interval", with = "duration_ms_serde")]
    pub min_interval: Duration,

    /// Also emit after this many items regardless of time (None = time only)
    #[serde(default)]
    pub min_items: Option<usize>,

    /// Weight of the newest per-item duration in the ETA moving average (default: 0.2)
    #[serde(default = "default_eta_smoothing")]
    pub eta_smoothing: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            min_interval: default_min_interval(),
            min_items: None,
            eta_smoothing: default_eta_smoothing(),
        }
    }
}

/// Export output
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory receiving the spreadsheet and archive (default: "exports")
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    /// Merged spreadsheet filename (default: "final_data.csv")
    ///
    /// The content is always CSV, whatever the extension.
    #[serde(default = "default_spreadsheet_name")]
    pub spreadsheet_name: String,

    /// Raw record archive filename (default: "Export.zip")
    #[serde(default = "default_archive_name")]
    pub archive_name: String,

    /// Separator between repeated subfield values in one cell (default: " | ")
    #[serde(default = "default_multi_value_separator")]
    pub multi_value_separator: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_dir: default_export_dir(),
            spreadsheet_name: default_spreadsheet_name(),
            archive_name: default_archive_name(),
            multi_value_separator: default_multi_value_separator(),
        }
    }
}

/// API and external server integration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerIntegrationConfig {
    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,

    /// Largest accepted identifier upload in bytes (default: 10 MiB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_records_dir() -> PathBuf {
    PathBuf::from("OCNrecords/requested")
}

fn default_holdings_dir() -> PathBuf {
    PathBuf::from("OCNrecords/requested_holdings")
}

fn default_identifier_column() -> String {
    "OCLC Number".into()
}

fn default_column_aliases() -> Vec<String> {
    vec!["ocn".into(), "oclc".into(), "oclc_number".into()]
}

fn default_delimiter() -> char {
    ';'
}

fn default_scope() -> String {
    "WorldCatMetadataAPI".into()
}

fn default_token_url() -> String {
    "https://oauth.oclc.org/token".into()
}

fn default_metadata_url() -> String {
    "https://metadata.api.oclc.org/worldcat".into()
}

fn default_holdings_symbols() -> Vec<String> {
    DEFAULT_HOLDINGS_SYMBOLS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_retry_statuses() -> Vec<u16> {
    vec![500, 502, 503, 504]
}

fn default_min_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_eta_smoothing() -> f64 {
    0.2
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("exports")
}

fn default_spreadsheet_name() -> String {
    "final_data.csv".into()
}

fn default_archive_name() -> String {
    "Export.zip".into()
}

fn default_multi_value_separator() -> String {
    " | ".into()
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

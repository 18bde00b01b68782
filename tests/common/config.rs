//! Test configuration helpers

use bibrecord_dl::Config;
use bibrecord_dl::config::{ExportConfig, ProgressConfig, StorageConfig};
use std::time::Duration;
use tempfile::TempDir;

/// Holdings symbols used by the integration tests
pub const TEST_SYMBOLS: &[&str] = &["QGE", "VU@"];

/// Config writing everything under `dir`, with two holdings symbols and unthrottled progress
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config {
        storage: StorageConfig {
            records_dir: dir.path().join("OCNrecords/requested"),
            holdings_dir: dir.path().join("OCNrecords/holdings"),
        },
        export: ExportConfig {
            export_dir: dir.path().join("exports"),
            ..ExportConfig::default()
        },
        progress: ProgressConfig {
            min_interval: Duration::ZERO,
            ..ProgressConfig::default()
        },
        ..Config::default()
    };
    config.worldcat.holdings_symbols = TEST_SYMBOLS.iter().map(|s| s.to_string()).collect();
    config
}

/// Load WorldCat credentials from the environment (and `.env`)
///
/// Required environment variables:
/// - `WORLDCAT_CLIENT_ID`
/// - `WORLDCAT_CLIENT_SECRET`
pub fn live_config(dir: &TempDir) -> Option<Config> {
    dotenvy::dotenv().ok();

    let client_id = std::env::var("WORLDCAT_CLIENT_ID").ok()?;
    let client_secret = std::env::var("WORLDCAT_CLIENT_SECRET").ok()?;

    let mut config = test_config(dir);
    config.worldcat.client_id = Some(client_id);
    config.worldcat.client_secret = Some(client_secret);
    config.worldcat.requests_per_second = Some(2);
    Some(config)
}

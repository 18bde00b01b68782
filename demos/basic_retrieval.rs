//! Basic retrieval example
//!
//! This example demonstrates the core functionality of bibrecord-dl:
//! - Configuring WorldCat credentials and holdings symbols
//! - Creating a retriever
//! - Subscribing to events
//! - Starting a run from an identifier table
//! - Exporting the merged spreadsheet
//!
//! ```bash
//! WORLDCAT_CLIENT_ID=... WORLDCAT_CLIENT_SECRET=... \
//!     cargo run --example basic_retrieval -- identifiers.csv
//! ```

use bibrecord_dl::config::{Config, ExportConfig, StorageConfig};
use bibrecord_dl::{Eta, Event, ExportOptions, Retriever, RunOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let table_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "identifiers.csv".to_string());

    let mut config = Config {
        storage: StorageConfig {
            records_dir: "OCNrecords/requested".into(),
            holdings_dir: "OCNrecords/holdings".into(),
        },
        export: ExportConfig {
            export_dir: "exports".into(),
            ..Default::default()
        },
        ..Default::default()
    };
    config.worldcat.client_id = std::env::var("WORLDCAT_CLIENT_ID").ok();
    config.worldcat.client_secret = std::env::var("WORLDCAT_CLIENT_SECRET").ok();
    config.worldcat.holdings_symbols = vec!["QGE".to_string(), "VU@".to_string()];

    let retriever = Retriever::with_worldcat(config)?;

    // Subscribe to events
    let mut events = retriever.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::RunStarted { total, .. } => {
                    println!("▶ Retrieving {} records", total);
                }
                Event::Progress { snapshot } => {
                    let eta = match snapshot.eta {
                        Eta::Unknown => "unknown".to_string(),
                        Eta::Remaining { seconds } => format!("{}s", seconds),
                    };
                    println!(
                        "⬇ {}/{} ({:.1}%), {} failed, ETA {}",
                        snapshot.completed, snapshot.total, snapshot.percent, snapshot.failed, eta
                    );
                }
                Event::ItemFailed { ocn, target, reason } => {
                    println!("✗ {} ({}): {}", ocn, target, reason);
                }
                Event::RunCompleted {
                    successes,
                    failures,
                    ..
                } => {
                    println!("✓ Run complete: {} records, {} failures", successes, failures);
                }
                Event::ExportComplete { spreadsheet, rows } => {
                    println!("📄 Exported {} rows to {}", rows, spreadsheet.display());
                }
                _ => {}
            }
        }
    });

    let table = std::fs::File::open(&table_path)?;
    let options = RunOptions {
        fetch_holdings: true,
        skip_existing: true,
    };
    let queued = retriever.start_from_reader(table, options).await?;
    println!("Queued {} identifiers from {}", queued, table_path);

    retriever.wait_for_completion().await;

    let summary = retriever.error_summary().await?;
    for entry in summary.entries() {
        println!("  {} {}: {}", entry.identifier, entry.target, entry.reason);
    }

    if retriever.export_available().await {
        let artifact = retriever
            .export(ExportOptions {
                include_holdings: true,
                archive: true,
            })
            .await?;
        println!(
            "Spreadsheet: {} ({} rows, {} with holdings)",
            artifact.spreadsheet.display(),
            artifact.rows,
            artifact.rows_with_holdings
        );
    } else {
        println!("Nothing to export");
    }

    retriever.shutdown().await?;
    Ok(())
}

//! REST API server example
//!
//! This example shows how to run bibrecord-dl with the REST API enabled,
//! allowing control via HTTP endpoints.
//!
//! After starting, you can:
//! - View Swagger UI at http://localhost:6790/swagger-ui
//! - Upload identifiers via POST http://localhost:6790/retrieval
//! - Monitor progress via GET http://localhost:6790/retrieval
//! - Stream events via GET http://localhost:6790/events

use bibrecord_dl::Retriever;
use bibrecord_dl::api::start_api_server;
use bibrecord_dl::config::{ApiConfig, Config, ServerIntegrationConfig};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let api_config = ApiConfig {
        bind_address: "127.0.0.1:6790".parse::<SocketAddr>()?,
        cors_enabled: true,
        cors_origins: vec!["*".to_string()],
        swagger_ui: true,
        ..Default::default()
    };

    let mut config = Config {
        server: ServerIntegrationConfig { api: api_config },
        ..Default::default()
    };
    config.worldcat.client_id = std::env::var("WORLDCAT_CLIENT_ID").ok();
    config.worldcat.client_secret = std::env::var("WORLDCAT_CLIENT_SECRET").ok();

    let retriever = Arc::new(Retriever::with_worldcat(config.clone())?);
    let config = Arc::new(config);

    println!("🚀 Starting bibrecord-dl REST API server");
    println!("📖 Swagger UI: http://localhost:6790/swagger-ui");
    println!("🔄 Events stream: http://localhost:6790/events");
    println!();
    println!("Example commands:");
    println!("  # Start a run with holdings");
    println!("  curl -F file=@identifiers.csv \\");
    println!("    -F 'options={{\"fetch_holdings\": true}}' \\");
    println!("    http://localhost:6790/retrieval");
    println!();
    println!("  # Progress, failures, export");
    println!("  curl http://localhost:6790/retrieval");
    println!("  curl 'http://localhost:6790/retrieval/errors?offset=0&limit=50'");
    println!("  curl -X POST http://localhost:6790/export");
    println!("  curl -o final_data.csv http://localhost:6790/export/download");

    let server = tokio::spawn(start_api_server(retriever.clone(), config));

    tokio::select! {
        result = server => {
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Shutting down");
            retriever.shutdown().await?;
        }
    }

    Ok(())
}

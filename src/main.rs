//! Photobooth share server
//!
//! Entry point for the kiosk backend.

use std::sync::Arc;

use dotenvy::dotenv;
use mimalloc::MiMalloc;

use photobooth_share::config::AppConfig;
use photobooth_share::{server, telemetry};

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing (M-LOG-STRUCTURED)
    telemetry::init(&config.telemetry);

    server::start_server(Arc::new(config)).await
}

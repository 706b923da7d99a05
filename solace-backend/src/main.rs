//! Solace chat backend -- in-memory development server.
//!
//! Serves the REST and WebSocket surface the sync engine expects. All state
//! lives in memory, so a restart wipes rooms and history.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:8000
//! cargo run --bin solace-backend
//!
//! # Run on custom address
//! cargo run --bin solace-backend -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! SOLACE_BACKEND_ADDR=127.0.0.1:8080 cargo run --bin solace-backend
//! ```

use std::sync::Arc;

use clap::Parser;
use solace_backend::config::{BackendCliArgs, BackendConfig};
use solace_backend::server::{self, BackendState};

#[tokio::main]
async fn main() {
    let cli = BackendCliArgs::parse();

    let config = match BackendConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting solace backend");

    let state = Arc::new(BackendState::new());
    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "backend listening");
            if let Err(e) = handle.await {
                tracing::error!(err = %e, "backend task failed");
            }
        }
        Err(e) => {
            tracing::error!(err = %e, "failed to start backend");
            std::process::exit(1);
        }
    }
}

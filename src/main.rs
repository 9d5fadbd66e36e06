// Main entry point for the imagetool-server application.
// Parses configuration, sets up logging, builds the Axum router around the
// image backend and serves the API plus the browser frontend.

mod imaging;
mod settings;
mod shutdown_signal;
mod web;

use clap::Parser;
use imaging::backend::RasterBackend;
use shutdown_signal::shutdown_signal;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::Level;
use web::{AppOptions, SharedBackend, create_app, create_listener};

/// Command line arguments for imagetool-server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct AppConfig {
    /// Hostname/IP to bind the server to.
    /// If this option is specified without value, it will default to "*", meaning the server will listen on all interfaces.
    #[arg(long, env = "IMAGETOOL_SERVER_HOST", default_value = "localhost", num_args = 0..=1, default_missing_value = "*")]
    host: String,

    /// Port number to listen on.
    #[arg(short, long, env = "IMAGETOOL_SERVER_PORT", default_value_t = 5000)]
    port: u16,

    /// Directory containing the browser frontend. Not served if it does not exist.
    #[arg(long, env = "IMAGETOOL_SERVER_STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,

    /// Maximum time in seconds a single request may take.
    #[arg(long, env = "IMAGETOOL_SERVER_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    request_timeout_secs: u64,

    /// Enable debug logging.
    #[arg(short, long, env = "IMAGETOOL_SERVER_VERBOSE", action = clap::ArgAction::SetTrue)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    // Parse command line args and environment variables
    let config = AppConfig::parse();

    tracing_subscriber::fmt()
        .with_max_level(if config.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(true) // Include module path in logs
        .with_file(true) // Include source file name
        .with_line_number(true) // Include line numbers
        .init();

    tracing::info!("Starting imagetool-server...");

    let static_dir = if config.static_dir.is_dir() {
        tracing::info!("Serving frontend from {}", config.static_dir.display());
        Some(config.static_dir)
    } else {
        tracing::warn!(
            "Frontend directory {} not found; serving the API only",
            config.static_dir.display()
        );
        None
    };

    let options = AppOptions {
        static_dir,
        request_timeout: Duration::from_secs(config.request_timeout_secs),
    };

    let backend: SharedBackend = Arc::new(RasterBackend::default());
    let app = create_app(backend, &options);

    tracing::info!("Axum router configured.");

    // --- Start HTTP Server ---
    let listener = match create_listener(&config.host, config.port).await {
        Ok((addr, l)) => {
            tracing::info!("Server successfully bound. Listening on {}", addr);
            l
        }
        Err(e) => {
            tracing::error!("FATAL: Failed to bind server: {}", e);
            eprintln!("FATAL: Could not bind server. Error: {}. Exiting.", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server run error: {}", e);
        eprintln!("ERROR: Server shut down unexpectedly. Error: {}", e);
    }

    tracing::info!("imagetool-server has shut down.");
}

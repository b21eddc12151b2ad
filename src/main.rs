//! quadrect - manual perspective rectification for folders of photos
//!
//! Serves a browser canvas on which the user clicks the four corners of a
//! quadrilateral (a table top, a document, a whiteboard) in each photo of
//! a source folder. The selected region is perspective-corrected into an
//! axis-aligned rectangle and written to a destination folder, advancing
//! photo by photo until the source folder is exhausted.

mod codec;
mod config;
mod library;
mod rectify;
mod server;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// quadrect - browser-based manual perspective rectification
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file naming the source and destination folders
    #[arg(short, long, default_value = "source_folders.json")]
    config: PathBuf,

    /// Web server host (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Web server port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("quadrect v{}", env!("CARGO_PKG_VERSION"));

    // The folder pair is required; there is no default configuration
    let config =
        config::Config::load(&args.config).context("configuration is required at startup")?;

    info!("Source folder: {:?}", config.source_folder);
    info!("Destination folder: {:?}", config.destination_folder);

    let host = args
        .host
        .clone()
        .unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);

    let manager =
        session::SessionManager::new(&config).context("failed to scan the source folder")?;
    if manager.is_exhausted() {
        info!("Nothing to rectify, every source image is already processed");
    }

    let state = Arc::new(server::AppState::new(config, manager));

    let addr = format!("{}:{}", host, port);
    info!("Starting web server at http://{}", addr);

    server::run_server(&addr, state).await
}

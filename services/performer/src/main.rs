//! Performer service entry point

use anyhow::{Context, Result};
use clap::Parser;
use performer::workers::{build_worker, WORKER_KINDS};
use performer::{http, logging, PerformerServer};
use performer_config::PerformerConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Performer task-execution runtime", long_about = None)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port, overrides server.port
    #[arg(short, long)]
    port: Option<u16>,

    /// Include error source chains in RPC errors and log at debug level
    #[arg(long)]
    debug: bool,

    /// Built-in worker (echo, json-square)
    #[arg(short, long)]
    worker: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        PerformerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.debug {
        config.server.debug = true;
        config.logging.level = "debug".to_string();
    }
    if let Some(worker) = args.worker {
        config.worker.kind = worker;
    }
    config.validate().context("Invalid configuration")?;

    if args.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    logging::init_tracing(&config.logging)?;

    info!("Starting performer v{}", env!("CARGO_PKG_VERSION"));
    info!("Available workers: {}", WORKER_KINDS.join(", "));

    let addr: SocketAddr = config
        .server
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind_address()))?;
    let worker = build_worker(&config.worker)?;

    let server = Arc::new(PerformerServer::builder(config).worker(worker).build());
    server.start();

    http::serve(Arc::clone(&server), addr, shutdown_signal()).await?;

    server.shutdown().await;
    info!("Performer stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

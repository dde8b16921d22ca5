use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chat_bridge::config::{self, CliOverrides};
use chat_bridge::source::run_loopback;
use chat_bridge::{Config, Hub, InstanceLock, LoopbackSource, Server};

#[derive(Parser)]
#[command(name = "chat-bridge")]
#[command(about = "Bridge chat messages to browser clients over WebSocket")]
struct Args {
    /// Port for the HTTP/WebSocket server
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Config file (TOML)
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let default_filter = if args.debug {
        "chat_bridge=debug,tower_http=debug"
    } else {
        "chat_bridge=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let overrides = CliOverrides {
        host: args.host,
        port: args.port,
    };
    let config: Config = config::load_config(&args.config, &overrides)
        .extract()
        .context("Failed to load configuration")?;
    config.validate()?;
    let addr = config.addr()?;

    let _instance = InstanceLock::acquire()?;

    let (source, loopback) = LoopbackSource::new(config.display_name.clone());
    let hub = Arc::new(
        Hub::new(Arc::new(source), &config.greeting, config.history_size)
            .context("Invalid greeting")?
            .with_queue_capacity(config.queue_capacity),
    );
    tokio::spawn(run_loopback(loopback, hub.clone()));

    let server = Server::bind(addr, hub).await?;
    info!(
        history_size = config.history_size,
        queue_capacity = config.queue_capacity,
        "Chat bridge ready on ws://{}/",
        server.local_addr()?
    );

    server.serve(shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal, exiting gracefully");
}

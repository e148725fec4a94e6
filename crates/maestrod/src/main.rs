//! Maestro control plane daemon.
//!
//! Loads configuration (`maestro.json` + `MAESTRO_*` env), opens the store,
//! starts the deployment scheduler exactly once, serves the HTTP surface,
//! and shuts everything down on SIGINT/SIGTERM with a bounded drain.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use maestro_server::{MaestroServer, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line arguments; everything else comes from config.
#[derive(Debug, Parser)]
#[command(name = "maestrod", about = "Maestro orchestration control plane")]
struct Args {
    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let mut config = ServerConfig::load().context("loading configuration")?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let server = MaestroServer::new(config).context("wiring control plane")?;
    let registered = server
        .start_scheduler()
        .context("starting deployment scheduler")?;
    info!(registered, "deployment scheduler running");

    let (addr, server_task) = server.listen().await.context("binding listener")?;
    info!(%addr, "maestro control plane ready");

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");

    server.stop(Some(Duration::from_secs(30))).await;
    server_task.abort();
    let _ = server_task.await;
    info!("goodbye");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

//! # HSTP Node
//!
//! Entry point: load configuration, install logging, run until Ctrl-C.
//!
//! Logging honours `RUST_LOG` (default `info`).

use anyhow::{Context, Result};
use hstp_node::{NodeConfig, NodeRuntime};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = NodeConfig::load().context("Failed to load configuration")?;
    let runtime = NodeRuntime::new(config)?;
    runtime.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Ctrl-C received");

    runtime.shutdown().await;
    Ok(())
}

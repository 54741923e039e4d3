//! # Quantum-Chain Node Runtime
//!
//! Runs the private contract extension subsystem (qc-18) on a development
//! node.
//!
//! ## Startup Sequence
//!
//! 1. Install the tracing subscriber (`RUST_LOG`, default `info`)
//! 2. Load configuration from the environment
//! 3. Check the encrypted store is reachable
//! 4. Restore the extension registry and start its watchers
//! 5. Run until Ctrl-C, then persist and stop

use anyhow::{Context, Result};
use node_runtime::{NodeConfig, NodeRuntime};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("===========================================");
    info!("  Quantum-Chain Node Runtime v{}", env!("CARGO_PKG_VERSION"));
    info!("  Subsystem: qc-18 Private Contract Extension");
    info!("===========================================");

    let config = NodeConfig::from_env().context("invalid node configuration")?;
    let runtime = NodeRuntime::start(config).await?;

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    runtime.shutdown()
}

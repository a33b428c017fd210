// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;

pub mod stream;

pub use context::ServerContext;
pub use stream::AnyStream;

/// The control service's entry point: wires the
/// configuration store, cluster-state aggregator, and fan-out engine
/// together, binds the agent-facing listener, and runs until a shutdown
/// signal arrives, in three phases: initialize, spawn background tasks, run
/// the accept loop.
pub async fn run(config: Config) -> Result<()> {
    let server_context = initialization::setup(config).await?;
    connection_loop::run(server_context).await;
    Ok(())
}

// src/bin/convergence_agentd.rs

//! Demo agent host: wires a logging `ConvergenceAgent` to `AgentService` and
//! keeps the connection to the control service alive. A real convergence
//! agent would replace `LoggingAgent` with one that drives a local
//! convergence loop over a container-runtime adapter — both out of this
//! crate's scope — and would call
//! `AgentServiceHandle::report_node_state` as it observes local changes.

use anyhow::Result;
use async_trait::async_trait;
use convergence_control::agent::{AgentConfig, AgentService, ConvergenceAgent};
use convergence_control::connection::ConnectionHandle;
use convergence_control::core::model::{Deployment, DeploymentState};
use std::env;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;

struct LoggingAgent;

#[async_trait]
impl ConvergenceAgent for LoggingAgent {
    async fn connected(&self, endpoint: ConnectionHandle) {
        info!("connected to control service at {}", endpoint.peer_addr);
    }

    async fn disconnected(&self) {
        info!("disconnected from control service");
    }

    async fn cluster_updated(&self, configuration: Deployment, state: DeploymentState) {
        info!(
            configuration_generation = configuration.generation,
            state_generation = state.generation,
            "received cluster status"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("convergence-agentd.toml");

    let config = match AgentConfig::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e}");
            std::process::exit(1);
        }
    };

    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .init();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
        let _ = shutdown_tx.send(());
    });

    let service = AgentService::new(config, Arc::new(LoggingAgent));
    if let Err(e) = service.run(shutdown_rx).await {
        error!("agent runtime error: {e}");
        return Err(e);
    }
    Ok(())
}

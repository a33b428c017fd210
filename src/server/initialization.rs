// src/server/initialization.rs

//! Start order for the control service: configuration store ready, then
//! cluster-state aggregator ready, then the fan-out engine is spawned (which
//! registers the config-change callback that triggers a broadcast), then the
//! agent-facing listener starts accepting connections. Grounded on the
//! teacher's own initialization module.

use super::context::ServerContext;
use crate::config::Config;
use crate::control;
use crate::core::model::{Deployment, InMemoryClusterStateAggregator, InMemoryConfigurationStore};
use crate::tls;
use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// Initializes all control service components before the accept loop starts.
///
/// Uses the crate's in-memory reference `ConfigurationStore` and
/// `ClusterStateAggregator`, treated as external collaborators; a deployment
/// that wires this crate to a real persistence service and cluster-state
/// aggregator would substitute its own implementations here.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let acceptor = if config.tls.enabled {
        info!("TLS is enabled for the agent port; requiring mutually authenticated connections.");
        Some(tls::server_acceptor(&config.tls.as_material())?)
    } else {
        None
    };

    let config_store = Arc::new(InMemoryConfigurationStore::new(Deployment::empty()));
    let aggregator = Arc::new(InMemoryClusterStateAggregator::new());
    info!("Configuration store and cluster-state aggregator ready.");

    let (fanout, fanout_task) = control::spawn_fanout(config_store.clone(), aggregator.clone());
    info!("Control fan-out engine started.");

    let listener = TcpListener::bind((config.host.as_str(), config.agent_port)).await?;
    info!("Control service listening for agents on {}:{}", config.host, config.agent_port);

    let metrics_task = if config.metrics.enabled {
        let shutdown_rx = shutdown_tx.subscribe();
        let port = config.metrics.port;
        Some(tokio::spawn(async move {
            super::metrics_server::run(port, shutdown_rx).await;
        }))
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
        None
    };

    Ok(ServerContext {
        config,
        listener,
        acceptor,
        fanout,
        fanout_task,
        config_store,
        aggregator,
        shutdown_tx,
        metrics_task,
    })
}

fn log_startup_info(config: &Config) {
    info!(
        "Starting control service, agent protocol major version {}",
        crate::protocol::PROTOCOL_MAJOR_VERSION
    );
    info!("Ping interval: {}s", config.ping_interval_secs);
}

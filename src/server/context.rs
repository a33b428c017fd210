// src/server/context.rs

use crate::config::Config;
use crate::control::FanoutHandle;
use crate::core::model::{ClusterStateAggregator, ConfigurationStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

/// Holds everything the main accept loop (`connection_loop::run`) needs once
/// `initialization::setup` has finished wiring collaborators together.
pub struct ServerContext {
    pub config: Config,
    pub listener: TcpListener,
    pub acceptor: Option<TlsAcceptor>,
    pub fanout: FanoutHandle,
    pub fanout_task: JoinHandle<()>,
    pub config_store: Arc<dyn ConfigurationStore>,
    pub aggregator: Arc<dyn ClusterStateAggregator>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub metrics_task: Option<JoinHandle<()>>,
}

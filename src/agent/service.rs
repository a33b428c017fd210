// src/agent/service.rs

//! Dials the control service, performs the `Version` handshake immediately
//! after connecting, starts the `Pinger`, and hands back a handle the
//! caller's local convergence loop can use to report `NodeState`. A version
//! mismatch is treated as fatal (`VersionMismatch`).

use crate::agent::config::AgentConfig;
use crate::agent::dispatcher::{AgentLocator, ConvergenceAgent};
use crate::connection::{ConnectionHandle, ConnectionHandler};
use crate::core::errors::ProtocolError;
use crate::core::model::ClusterStateChange;
use crate::pinger::Pinger;
use crate::protocol::commands::Command as _;
use crate::protocol::{NodeState, PROTOCOL_MAJOR_VERSION, TraceContext, Version};
use crate::server::stream::AnyStream;
use crate::tls;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// A live connection to the control service: lets the caller's local
/// convergence loop report `NodeState` and keeps the `Pinger` alive for as
/// long as it is held.
pub struct AgentServiceHandle {
    connection: ConnectionHandle,
    _pinger: Pinger,
    next_trace: AtomicU64,
}

impl AgentServiceHandle {
    /// Reports a batch of locally observed state changes to the control
    /// service via `NodeState`. `changes` must be non-empty per the wire
    /// contract.
    pub async fn report_node_state(&self, changes: Vec<ClusterStateChange>) -> Result<(), ProtocolError> {
        debug_assert!(!changes.is_empty(), "NodeState requires a non-empty change set");
        let trace = TraceContext(self.next_trace.fetch_add(1, Ordering::SeqCst));
        self.connection.call(NodeState { state_changes: changes, trace }).await
    }

    pub fn connection(&self) -> ConnectionHandle {
        self.connection.clone()
    }
}

/// Dials the control service named by `config`, performs the TLS handshake
/// (if enabled) and the `Version` handshake, and spawns the connection's
/// read/write loop plus its `Pinger`. Returns once the handshake succeeds;
/// the returned `JoinHandle` resolves when the connection is lost.
pub async fn connect<A: ConvergenceAgent + 'static>(
    config: &AgentConfig,
    agent: Arc<A>,
    shutdown_rx: broadcast::Receiver<()>,
) -> Result<(AgentServiceHandle, JoinHandle<Result<(), ProtocolError>>)> {
    let addr = format!("{}:{}", config.control_host, config.control_port);
    let tcp_stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to control service at '{addr}'"))?;
    let peer_addr = tcp_stream.peer_addr().with_context(|| "failed to read peer address")?;

    let stream = if config.tls.enabled {
        let material = config.tls.as_material();
        let connector = tls::client_connector(&material)?;
        let domain = tls::server_name(&config.control_host)?;
        let tls_stream = connector
            .connect(domain, tcp_stream)
            .await
            .with_context(|| format!("TLS handshake with control service at '{addr}' failed"))?;
        AnyStream::TlsClient(Box::new(tls_stream))
    } else {
        AnyStream::Tcp(tcp_stream)
    };

    let locator = Arc::new(AgentLocator::new(agent));
    let (mut handler, connection) = ConnectionHandler::new(stream, peer_addr, locator, shutdown_rx);
    let join = tokio::spawn(async move { handler.run().await });

    let version = match connection.call(Version).await.context("Version handshake failed") {
        Ok(version) => version,
        Err(e) => {
            join.abort();
            return Err(e);
        }
    };
    if version.major != PROTOCOL_MAJOR_VERSION {
        join.abort();
        return Err(ProtocolError::VersionMismatch { expected: PROTOCOL_MAJOR_VERSION, peer: version.major }.into());
    }
    info!("connected to control service at '{addr}', protocol version {}", version.major);

    let pinger = Pinger::start(connection.outbound(), crate::pinger::PING_INTERVAL);
    let handle = AgentServiceHandle { connection, _pinger: pinger, next_trace: AtomicU64::new(0) };
    Ok((handle, join))
}

/// The agent service: owns the configuration and delegate across
/// reconnection attempts. Reconnection with backoff is out of scope here;
/// callers that want it wrap `connect` in their own retry loop.
pub struct AgentService<A: ConvergenceAgent> {
    config: AgentConfig,
    agent: Arc<A>,
}

impl<A: ConvergenceAgent + 'static> AgentService<A> {
    pub fn new(config: AgentConfig, agent: Arc<A>) -> Self {
        Self { config, agent }
    }

    /// Connects once and runs until the connection is lost or `shutdown_rx`
    /// fires.
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let (_handle, join) = connect(&self.config, self.agent.clone(), shutdown_rx).await?;
        match join.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(anyhow::anyhow!("connection task panicked: {e}")),
        }
    }
}

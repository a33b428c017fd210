// src/agent/dispatcher.rs

//! The agent dispatcher: on receipt of `ClusterStatus`, enters
//! the resumed logging scope carried by its `TraceContext` and forwards the
//! decoded `(configuration, state)` into a user-supplied `ConvergenceAgent`.
//! Realized as a static match in `dispatch` rather than a runtime-registered
//! command table.

use crate::connection::{ConnectionHandle, Locator};
use crate::core::errors::ProtocolError;
use crate::core::model::{Deployment, DeploymentState};
use crate::protocol::commands::Command as _;
use crate::protocol::frame::Box as WireBox;
use crate::protocol::{ClusterStatus, NoOp};
use async_trait::async_trait;
use tracing::Instrument;

/// The user-supplied delegate that reacts to cluster state pushed down from
/// the control service. Implementations must be idempotent under duplicate
/// or delayed `cluster_updated` calls: the coalescing broadcast engine
/// guarantees eventual delivery of the latest snapshot, not delivery of
/// every intermediate one.
#[async_trait]
pub trait ConvergenceAgent: Send + Sync {
    /// Called once, right after the connection to the control service is
    /// established and the version handshake succeeds.
    async fn connected(&self, endpoint: ConnectionHandle);

    /// Called once the connection to the control service is lost, for any
    /// reason.
    async fn disconnected(&self);

    /// Called on every `ClusterStatus` push. May be called with a stale or
    /// repeated `(configuration, state)` pair; callers must tolerate that.
    async fn cluster_updated(&self, configuration: Deployment, state: DeploymentState);
}

/// Binds the agent-side wire protocol to a `ConvergenceAgent`. One
/// `AgentLocator` is constructed per connection to the control service
/// (mirroring `ControlServiceLocator`'s one-per-connection lifetime on the
/// other side), though in practice an agent dials exactly one control
/// service at a time.
pub struct AgentLocator<A: ConvergenceAgent> {
    agent: std::sync::Arc<A>,
}

impl<A: ConvergenceAgent> AgentLocator<A> {
    pub fn new(agent: std::sync::Arc<A>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl<A: ConvergenceAgent + 'static> Locator for AgentLocator<A> {
    async fn on_connected(&self, handle: ConnectionHandle) {
        self.agent.connected(handle).await;
    }

    async fn on_disconnected(&self) {
        self.agent.disconnected().await;
    }

    async fn dispatch(&self, command: &str, body: WireBox) -> Result<Option<WireBox>, ProtocolError> {
        match command {
            "ClusterStatus" => {
                let request = ClusterStatus::decode_request(&body)?;
                let span = tracing::info_span!("cluster_updated", trace = request.trace.0);
                self.agent
                    .cluster_updated(request.configuration, request.state)
                    .instrument(span)
                    .await;
                Ok(Some(WireBox::new()))
            }
            "NoOp" => {
                NoOp::decode_request(&body)?;
                Ok(None)
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

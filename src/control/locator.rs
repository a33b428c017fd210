// src/control/locator.rs

//! The control service's `Locator`: answers `Version`/`NoOp` like any
//! endpoint, applies incoming `NodeState` reports to the cluster-state
//! aggregator under the connection's own `ChangeSource`, and registers/
//! deregisters the connection with the fan-out engine (C7) as it comes up
//! and goes down: creates a `ChangeSource` per connection, touches it on
//! every dispatch, and forwards `NodeState` into the cluster state.

use crate::connection::{ConnectionHandle, Locator};
use crate::control::fanout::{ConnectionId, FanoutHandle};
use crate::core::errors::ProtocolError;
use crate::core::metrics;
use crate::core::model::{ChangeSource, ClusterStateAggregator};
use crate::protocol::commands::Command as _;
use crate::protocol::frame::Box as WireBox;
use crate::protocol::{NoOp, NodeState, PROTOCOL_MAJOR_VERSION, Version, VersionResponse};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

struct Registration {
    id: ConnectionId,
    source: Arc<ChangeSource>,
}

/// One `ControlServiceLocator` is constructed per accepted agent connection
/// (see the accept loop in `control::service`); it is not shared across
/// connections.
pub struct ControlServiceLocator {
    fanout: FanoutHandle,
    aggregator: Arc<dyn ClusterStateAggregator>,
    registration: Mutex<Option<Registration>>,
}

impl ControlServiceLocator {
    pub fn new(fanout: FanoutHandle, aggregator: Arc<dyn ClusterStateAggregator>) -> Self {
        Self { fanout, aggregator, registration: Mutex::new(None) }
    }

    fn touch_change_source(&self) {
        if let Some(reg) = self.registration.lock().as_ref() {
            reg.source.touch();
        }
    }
}

#[async_trait]
impl Locator for ControlServiceLocator {
    async fn on_connected(&self, handle: ConnectionHandle) {
        metrics::CONNECTIONS_RECEIVED_TOTAL.inc();
        let (id, source) = self.fanout.register(handle).await;
        *self.registration.lock() = Some(Registration { id, source });
    }

    async fn on_disconnected(&self) {
        if let Some(reg) = self.registration.lock().take() {
            self.fanout.deregister(reg.id);
        }
    }

    async fn dispatch(&self, command: &str, body: WireBox) -> Result<Option<WireBox>, ProtocolError> {
        // Every inbound dispatch touches the connection's ChangeSource
        // before the responder runs, regardless of which command it is.
        self.touch_change_source();

        match command {
            "Version" => {
                let mut resp = WireBox::new();
                Version::encode_response(&VersionResponse { major: PROTOCOL_MAJOR_VERSION }, &mut resp)?;
                Ok(Some(resp))
            }
            "NoOp" => {
                NoOp::decode_request(&body)?;
                Ok(None)
            }
            "NodeState" => {
                let report = NodeState::decode_request(&body)?;
                let source_id = self
                    .registration
                    .lock()
                    .as_ref()
                    .map(|reg| reg.source.id)
                    .ok_or_else(|| {
                        ProtocolError::Internal("NodeState received before connection registration completed".into())
                    })?;
                debug!(
                    changes = report.state_changes.len(),
                    source = source_id.0,
                    "applying NodeState report"
                );
                self.aggregator.apply_changes_from_source(source_id, report.state_changes).await;
                metrics::NODE_STATE_UPDATES_TOTAL.inc();
                self.fanout.notify_node_state_changed();
                Ok(Some(WireBox::new()))
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

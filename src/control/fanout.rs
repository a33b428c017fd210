// src/control/fanout.rs

//! The control fan-out engine — the core of the crate. Owns the connection
//! registry and per-connection "is a send already in flight" bookkeeping as
//! a single value driven by one task, a single-owner discipline that keeps
//! every mutation on one task instead of behind shared locks. External
//! callers talk to it only through `FanoutHandle`, which forwards commands
//! over an `mpsc` channel — nothing here is ever cloned or shared across
//! tasks directly.
//!
//! Broadcasts a snapshot to every connection; if a connection already has a
//! send in flight, sets a single coalescing bit instead of queuing a second
//! send; when the in-flight send completes, if the bit was set, sends one
//! more snapshot (the *current* one, not the one that was current when
//! coalescing was requested) and clears the bit.

use crate::cache::{EncodingCache, with_encoding_cache};
use crate::connection::ConnectionHandle;
use crate::core::errors::ProtocolError;
use crate::core::metrics;
use crate::core::model::{
    ChangeSource, ChangeSourceId, ClusterStateAggregator, ConfigurationStore, Deployment,
    DeploymentState,
};
use crate::protocol::commands::{Big, WireValue};
use crate::protocol::frame::Box as WireBox;
use crate::protocol::{PROTOCOL_MAJOR_VERSION, TraceContext};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// One agent connection as tracked by the fan-out engine: its outbound
/// handle and the `ChangeSource` created for it when it registered.
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub handle: ConnectionHandle,
    pub source: Arc<ChangeSource>,
}

enum FanoutCommand {
    Register {
        handle: ConnectionHandle,
        reply: oneshot::Sender<(ConnectionId, Arc<ChangeSource>)>,
    },
    Deregister {
        id: ConnectionId,
    },
    /// The `ConfigurationStore`'s desired configuration changed.
    ConfigurationChanged,
    /// A `NodeState` report was folded into the cluster-state aggregator.
    /// Broadcasts the merged state to every connection, not just the
    /// reporting one, per "node_changed: ... schedule a broadcast to all
    /// current connections".
    NodeStateChanged,
}

/// A cheaply-cloneable handle used to interact with a running
/// `ControlFanout` from connection tasks, the config-change listener, and
/// the service's accept loop.
#[derive(Clone)]
pub struct FanoutHandle {
    tx: mpsc::UnboundedSender<FanoutCommand>,
}

impl FanoutHandle {
    /// Registers a newly accepted agent connection, creating its
    /// `ChangeSource`, and immediately sends it the current snapshot —
    /// mirroring `ControlServiceLocator` creating one `ChangeSource` per
    /// connection and the original sending state as soon as a connection is
    /// known.
    pub async fn register(&self, handle: ConnectionHandle) -> (ConnectionId, Arc<ChangeSource>) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(FanoutCommand::Register { handle, reply }).is_err() {
            panic!("control fan-out task is gone; the service is shutting down");
        }
        rx.await.expect("fan-out task dropped the registration reply")
    }

    pub fn deregister(&self, id: ConnectionId) {
        let _ = self.tx.send(FanoutCommand::Deregister { id });
    }

    pub fn notify_configuration_changed(&self) {
        let _ = self.tx.send(FanoutCommand::ConfigurationChanged);
    }

    /// Tells the fan-out engine a `NodeState` report was applied to the
    /// cluster-state aggregator, so it should broadcast the merged state to
    /// every connection (not only the one that reported it).
    pub fn notify_node_state_changed(&self) {
        let _ = self.tx.send(FanoutCommand::NodeStateChanged);
    }
}

/// Wraps a pre-encoded payload as a `WireValue` so `Big` can chunk bytes
/// that the encoding cache already produced, instead of re-serializing them.
struct Precomputed(Bytes);

impl WireValue for Precomputed {
    fn encode(&self) -> Result<Bytes, ProtocolError> {
        Ok(self.0.clone())
    }

    fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Precomputed(Bytes::copy_from_slice(bytes)))
    }
}

fn build_cluster_status_box(
    cache: &mut EncodingCache,
    configuration: &Deployment,
    state: &DeploymentState,
    trace: TraceContext,
) -> Result<WireBox, ProtocolError> {
    let mut dst = WireBox::new();
    let configuration_bytes = cache.encode_configuration(configuration)?;
    let state_bytes = cache.encode_state(state)?;
    Big(Precomputed(configuration_bytes)).to_box("configuration", &mut dst)?;
    Big(Precomputed(state_bytes)).to_box("state", &mut dst)?;
    trace.to_box(&mut dst);
    Ok(dst)
}

/// The fan-out engine's owned state. Never `Clone`d, never shared: `spawn`
/// moves it onto its own task and returns only a `FanoutHandle`.
struct ControlFanout {
    config_store: Arc<dyn ConfigurationStore>,
    aggregator: Arc<dyn ClusterStateAggregator>,
    connections: HashMap<ConnectionId, ConnectionRecord>,
    /// `true` means a broadcast was requested again while a send to this
    /// connection was already in flight — the single coalescing bit from
    /// the design notes, not a queue.
    in_flight: HashMap<ConnectionId, bool>,
    cache: EncodingCache,
    next_id: u64,
}

impl ControlFanout {
    fn new(config_store: Arc<dyn ConfigurationStore>, aggregator: Arc<dyn ClusterStateAggregator>) -> Self {
        Self {
            config_store,
            aggregator,
            connections: HashMap::new(),
            in_flight: HashMap::new(),
            cache: EncodingCache::new(),
            next_id: 0,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<FanoutCommand>) {
        let (completion_tx, mut completion_rx) = mpsc::unbounded_channel::<ConnectionId>();
        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd, &completion_tx).await,
                        None => break,
                    }
                }
                Some(id) = completion_rx.recv() => {
                    self.handle_send_completed(id, &completion_tx).await;
                }
            }
        }
        info!("control fan-out engine shutting down with {} connections still registered", self.connections.len());
    }

    async fn handle_command(&mut self, cmd: FanoutCommand, completion_tx: &mpsc::UnboundedSender<ConnectionId>) {
        match cmd {
            FanoutCommand::Register { handle, reply } => {
                self.next_id += 1;
                let id = ConnectionId(self.next_id);
                let source = Arc::new(ChangeSource::new(ChangeSourceId(self.next_id)));
                self.connections.insert(
                    id,
                    ConnectionRecord { id, handle, source: source.clone() },
                );
                metrics::CONNECTED_AGENTS.inc();

                let configuration = self.config_store.get().await;
                let state = self.aggregator.as_deployment_state().await;
                with_encoding_cache(&mut self.cache, |cache| {
                    Self::initiate_send(
                        &self.connections,
                        &mut self.in_flight,
                        cache,
                        id,
                        &configuration,
                        &state,
                        completion_tx,
                    );
                });

                // Only now — after the initial `ClusterStatus` has actually
                // been enqueued onto the connection's outbound channel by
                // `initiate_send` above — unblock
                // `ControlServiceLocator::on_connected`'s await on this
                // reply, so `ConnectionHandler::run_loop` can never start
                // selecting before its first push already sits ahead of it
                // in `outbound_tx`.
                let _ = reply.send((id, source));
            }
            FanoutCommand::Deregister { id } => {
                if self.connections.remove(&id).is_some() {
                    metrics::CONNECTED_AGENTS.dec();
                }
                self.in_flight.remove(&id);
            }
            FanoutCommand::ConfigurationChanged | FanoutCommand::NodeStateChanged => {
                metrics::BROADCASTS_INITIATED_TOTAL.inc();
                let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();

                // Snapshot configuration/state exactly once for the whole
                // broadcast round, and keep the encoding cache active across
                // every connection in `ids` so a shared snapshot is encoded
                // once and reused, not once per connection.
                let configuration = self.config_store.get().await;
                let state = self.aggregator.as_deployment_state().await;
                with_encoding_cache(&mut self.cache, |cache| {
                    for id in ids {
                        Self::initiate_send(
                            &self.connections,
                            &mut self.in_flight,
                            cache,
                            id,
                            &configuration,
                            &state,
                            completion_tx,
                        );
                    }
                });
            }
        }
    }

    /// Starts (or coalesces into) a send to `id` using the already-fetched
    /// `configuration`/`state` snapshot for this broadcast round.
    fn initiate_send(
        connections: &HashMap<ConnectionId, ConnectionRecord>,
        in_flight: &mut HashMap<ConnectionId, bool>,
        cache: &mut EncodingCache,
        id: ConnectionId,
        configuration: &Deployment,
        state: &DeploymentState,
        completion_tx: &mpsc::UnboundedSender<ConnectionId>,
    ) {
        if let Some(coalesce_pending) = in_flight.get_mut(&id) {
            *coalesce_pending = true;
            metrics::BROADCASTS_COALESCED_TOTAL.inc();
            return;
        }
        let Some(record) = connections.get(&id) else {
            return;
        };
        let handle = record.handle.clone();
        let trace = TraceContext(record.source.id.0);

        let body = match build_cluster_status_box(cache, configuration, state, trace) {
            Ok(body) => body,
            Err(e) => {
                warn!("failed to encode ClusterStatus for connection {}: {e}", id.0);
                return;
            }
        };

        // Enqueue onto the connection's outbound channel synchronously,
        // before this function returns — so a caller that only needs to
        // know "has the push been queued yet" (the `Register` arm above)
        // can rely on that happening within this call, rather than racing a
        // separately spawned task that does the enqueue itself.
        let rx = match handle.send_raw_awaiting("ClusterStatus", body) {
            Ok(rx) => rx,
            Err(e) => {
                warn!("failed to queue ClusterStatus for connection {}: {e}", id.0);
                return;
            }
        };

        in_flight.insert(id, false);
        let completion_tx = completion_tx.clone();
        let span = tracing::info_span!("send_cluster_state", connection = id.0, trace = trace.0);
        tokio::spawn(
            async move {
                match rx.await {
                    Ok(Ok(_)) => metrics::STATE_SENDS_TOTAL.inc(),
                    Ok(Err(e)) => {
                        // Swallowed deliberately: a send failure here means
                        // the connection is probably already gone or about
                        // to be, and `Deregister` (driven by the
                        // connection's own read loop exiting) is the
                        // authoritative signal to stop trying, not this
                        // error. See DESIGN.md for why this is a metric +
                        // debug log rather than a propagated failure.
                        metrics::SEND_FAILURES_TOTAL.inc();
                        debug!("ClusterStatus send to connection {} failed: {e}", id.0);
                    }
                    Err(_) => {
                        metrics::SEND_FAILURES_TOTAL.inc();
                        debug!("ClusterStatus send to connection {} failed: connection lost", id.0);
                    }
                }
                let _ = completion_tx.send(id);
            }
            .instrument(span),
        );
    }

    async fn handle_send_completed(&mut self, id: ConnectionId, completion_tx: &mpsc::UnboundedSender<ConnectionId>) {
        let coalesce_pending = self.in_flight.remove(&id).unwrap_or(false);
        if coalesce_pending && self.connections.contains_key(&id) {
            let configuration = self.config_store.get().await;
            let state = self.aggregator.as_deployment_state().await;
            with_encoding_cache(&mut self.cache, |cache| {
                Self::initiate_send(
                    &self.connections,
                    &mut self.in_flight,
                    cache,
                    id,
                    &configuration,
                    &state,
                    completion_tx,
                );
            });
        }
    }
}

/// Spawns a `ControlFanout` onto its own task and registers it as the
/// `ConfigurationStore`'s change listener, so that any future configuration
/// update triggers a broadcast — the Rust realization of
/// `configuration_service.register(lambda: self._send_state_to_connections(...))`.
pub fn spawn(
    config_store: Arc<dyn ConfigurationStore>,
    aggregator: Arc<dyn ClusterStateAggregator>,
) -> (FanoutHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = FanoutHandle { tx };
    let listener_handle = handle.clone();
    config_store.register(Arc::new(move || listener_handle.notify_configuration_changed()));

    let fanout = ControlFanout::new(config_store, aggregator);
    let join = tokio::spawn(fanout.run(rx));
    (handle, join)
}

/// The protocol major version this build speaks; exposed here so the
/// locator can answer `Version` without importing `protocol` directly.
pub const fn protocol_major_version() -> u32 {
    PROTOCOL_MAJOR_VERSION
}

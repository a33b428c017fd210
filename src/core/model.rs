// src/core/model.rs

//! The data model shared by the control service and the agent dispatcher:
//! desired configuration (`Deployment`), observed cluster state
//! (`DeploymentState`), per-agent state updates (`ClusterStateChange`), and
//! the collaborator traits (`ConfigurationStore`, `ClusterStateAggregator`)
//! that the rest of the crate treats as external services.

use crate::core::errors::ProtocolError;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Serializes a value to the crate's wire format: bincode, via its serde
/// bridge, with `bincode::config::standard()`.
pub fn wire_encode<T: Serialize>(value: &T) -> Result<Bytes, ProtocolError> {
    let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard())?;
    Ok(Bytes::from(bytes))
}

/// Deserializes a value previously produced by [`wire_encode`].
pub fn wire_decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(data, bincode::config::standard())?;
    Ok(value)
}

/// The desired cluster configuration, as held by the control service's
/// `ConfigurationStore`. Opaque to the protocol layer: callers treat the
/// payload as a serialized document (JSON, YAML, whatever the real store
/// persists) and only the generation is load-bearing for change detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
pub struct Deployment {
    pub generation: u64,
    pub payload: Bytes,
}

impl Deployment {
    pub fn empty() -> Self {
        Self { generation: 0, payload: Bytes::new() }
    }
}

/// The observed cluster state, as computed by the `ClusterStateAggregator`
/// from all agents' reported `ClusterStateChange`s.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
pub struct DeploymentState {
    pub generation: u64,
    pub payload: Bytes,
}

impl DeploymentState {
    pub fn empty() -> Self {
        Self { generation: 0, payload: Bytes::new() }
    }
}

/// A single state-change record reported by a convergence agent via
/// `NodeState`. The `kind` discriminates the shape of `payload` for whatever
/// higher-level aggregator interprets it; the protocol layer never inspects
/// it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct ClusterStateChange {
    pub kind: String,
    pub payload: Bytes,
}

/// Identifies a `ChangeSource` uniquely for the lifetime of its connection.
/// Assigned by the control service when a connection is accepted; never
/// reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangeSourceId(pub u64);

/// Tracks the agent connection that most recently reported a given set of
/// state changes, plus when it was last heard from. One `ChangeSource` is
/// created per connection (see `ControlFanout::register`).
#[derive(Debug)]
pub struct ChangeSource {
    pub id: ChangeSourceId,
    last_activity: Mutex<Instant>,
}

impl ChangeSource {
    pub fn new(id: ChangeSourceId) -> Self {
        Self { id, last_activity: Mutex::new(Instant::now()) }
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }
}

/// A listener invoked whenever the `ConfigurationStore`'s desired
/// configuration changes. The control fan-out engine registers one of these
/// at startup to learn when to re-broadcast.
pub type ConfigChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Holds the desired cluster configuration and notifies registered listeners
/// when it changes. In production this is backed by whatever persistence
/// layer the deployment uses; the crate ships an in-memory reference
/// implementation for tests and the demo binaries.
#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    async fn get(&self) -> Deployment;
    fn register(&self, listener: ConfigChangeListener);
}

/// Accumulates `ClusterStateChange`s reported by agents (keyed by the
/// `ChangeSource` that reported them) into a single observed
/// `DeploymentState` snapshot.
#[async_trait]
pub trait ClusterStateAggregator: Send + Sync {
    async fn apply_changes_from_source(
        &self,
        source: ChangeSourceId,
        changes: Vec<ClusterStateChange>,
    );
    async fn as_deployment_state(&self) -> DeploymentState;
}

/// A minimal in-memory `ConfigurationStore`: holds one `Deployment` behind a
/// lock and fires every registered listener, synchronously, whenever
/// `set` replaces it. Sufficient for tests and for the `convergence-agentd`
/// demo binary; a real control service backs this with persistent storage.
pub struct InMemoryConfigurationStore {
    current: Mutex<Deployment>,
    listeners: Mutex<Vec<ConfigChangeListener>>,
}

impl InMemoryConfigurationStore {
    pub fn new(initial: Deployment) -> Self {
        Self {
            current: Mutex::new(initial),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the desired configuration and notifies every listener.
    pub fn set(&self, deployment: Deployment) {
        *self.current.lock() = deployment;
        for listener in self.listeners.lock().iter() {
            listener();
        }
    }
}

#[async_trait]
impl ConfigurationStore for InMemoryConfigurationStore {
    async fn get(&self) -> Deployment {
        self.current.lock().clone()
    }

    fn register(&self, listener: ConfigChangeListener) {
        self.listeners.lock().push(listener);
    }
}

/// A minimal in-memory `ClusterStateAggregator`: keeps the latest batch of
/// changes per `ChangeSourceId` and flattens them into a deterministic
/// (BTreeMap-ordered) snapshot on demand. The generation counter increments
/// on every apply so that consumers can detect staleness even when the
/// flattened payload happens to be byte-identical.
pub struct InMemoryClusterStateAggregator {
    changes: DashMap<ChangeSourceId, Vec<ClusterStateChange>>,
    generation: AtomicU64,
}

impl Default for InMemoryClusterStateAggregator {
    fn default() -> Self {
        Self {
            changes: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }
}

impl InMemoryClusterStateAggregator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClusterStateAggregator for InMemoryClusterStateAggregator {
    async fn apply_changes_from_source(
        &self,
        source: ChangeSourceId,
        changes: Vec<ClusterStateChange>,
    ) {
        self.changes.insert(source, changes);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    async fn as_deployment_state(&self) -> DeploymentState {
        let mut flattened: BTreeMap<u64, Vec<ClusterStateChange>> = BTreeMap::new();
        for entry in self.changes.iter() {
            flattened.insert(entry.key().0, entry.value().clone());
        }
        let generation = self.generation.load(Ordering::SeqCst);
        let payload = wire_encode(&flattened).unwrap_or_default();
        DeploymentState { generation, payload }
    }
}

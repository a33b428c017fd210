//! Exercises `ControlFanout` end to end through `FanoutHandle` and a real
//! `ConnectionHandler`, never reaching into the (private) `ControlFanout`
//! struct itself.

use async_trait::async_trait;
use bytes::Bytes;
use convergence_control::connection::{ConnectionHandler, Locator};
use convergence_control::control::{spawn_fanout, ConnectionId};
use convergence_control::core::errors::ProtocolError;
use convergence_control::core::model::{
    ChangeSourceId, ClusterStateAggregator as _, ClusterStateChange, Deployment,
    InMemoryClusterStateAggregator, InMemoryConfigurationStore,
};
use convergence_control::protocol::commands::Serializable;
use convergence_control::protocol::frame::Box as WireBox;
use convergence_control::protocol::Big;
use convergence_control::server::stream::AnyStream;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::test_helpers::{addr, connected_handle};

#[tokio::test]
async fn registering_a_connection_sends_an_initial_snapshot() {
    let config_store = Arc::new(InMemoryConfigurationStore::new(Deployment::empty()));
    let aggregator = Arc::new(InMemoryClusterStateAggregator::new());
    let (fanout, _join) = spawn_fanout(config_store, aggregator);

    let (handle, _conn_join) = connected_handle().await;
    let (id, _source) = fanout.register(handle).await;
    assert_eq!(id, ConnectionId(1));
}

/// A `Locator` whose `ClusterStatus` dispatch blocks on a shared `Notify`
/// until the test releases it, and records every `configuration` payload it
/// was handed so the test can tell which snapshot a given send carried.
struct GatedClusterStatusLocator {
    release: Arc<tokio::sync::Notify>,
    seen_configurations: Arc<std::sync::Mutex<Vec<Deployment>>>,
}

#[async_trait]
impl Locator for GatedClusterStatusLocator {
    async fn dispatch(&self, command: &str, body: WireBox) -> Result<Option<WireBox>, ProtocolError> {
        if command == "ClusterStatus" {
            let Serializable(configuration) =
                Big::<Serializable<Deployment>>::from_box("configuration", &body)?;
            self.seen_configurations.lock().unwrap().push(configuration);
            self.release.notified().await;
        }
        Ok(Some(WireBox::new()))
    }
}

#[tokio::test]
async fn coalesces_config_changes_that_arrive_while_a_send_is_in_flight() {
    let config_store = Arc::new(InMemoryConfigurationStore::new(Deployment {
        generation: 0,
        payload: Bytes::from_static(b"v0"),
    }));
    let aggregator = Arc::new(InMemoryClusterStateAggregator::new());
    let (fanout, _join) = spawn_fanout(config_store.clone(), aggregator);

    let release = Arc::new(tokio::sync::Notify::new());
    let seen_configurations = Arc::new(std::sync::Mutex::new(Vec::new()));
    let locator = Arc::new(GatedClusterStatusLocator {
        release: release.clone(),
        seen_configurations: seen_configurations.clone(),
    });

    let (_peer, ours) = tokio::io::duplex(64 * 1024);
    let (shutdown_tx, _rx) = broadcast::channel::<()>(1);
    let (mut handler, handle) =
        ConnectionHandler::new(AnyStream::from_duplex(ours), addr(), locator, shutdown_tx.subscribe());
    let _conn_join = tokio::spawn(async move {
        let _ = handler.run().await;
    });

    // Registering sends the initial snapshot, which blocks in
    // `GatedClusterStatusLocator::dispatch` until released below.
    let (_id, _source) = fanout.register(handle).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(seen_configurations.lock().unwrap().len(), 1, "initial send should be in flight");

    // Three rapid configuration changes while the initial send is still in
    // flight must coalesce into a single follow-up send, not three.
    config_store.set(Deployment { generation: 1, payload: Bytes::from_static(b"v1") });
    config_store.set(Deployment { generation: 2, payload: Bytes::from_static(b"v2") });
    config_store.set(Deployment { generation: 3, payload: Bytes::from_static(b"v3") });
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(
        seen_configurations.lock().unwrap().len(),
        1,
        "no new send should start while the first is still in flight"
    );

    // Release the held initial send; the completion should trigger exactly
    // one coalesced resend carrying the latest configuration.
    release.notify_one();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    release.notify_one();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let seen = seen_configurations.lock().unwrap().clone();
    assert_eq!(seen.len(), 2, "exactly one coalesced resend, not one per configuration change");
    assert_eq!(seen[1].generation, 3, "the coalesced resend must carry the latest configuration");
}

#[tokio::test]
async fn configuration_change_triggers_a_broadcast_to_registered_connections() {
    let config_store = Arc::new(InMemoryConfigurationStore::new(Deployment::empty()));
    let aggregator = Arc::new(InMemoryClusterStateAggregator::new());
    aggregator
        .apply_changes_from_source(
            ChangeSourceId(99),
            vec![ClusterStateChange { kind: "node".into(), payload: Bytes::from_static(b"up") }],
        )
        .await;
    let (fanout, _join) = spawn_fanout(config_store.clone(), aggregator);

    let (handle, _conn_join) = connected_handle().await;
    let (_id, _source) = fanout.register(handle).await;

    config_store.set(Deployment { generation: 1, payload: Bytes::from_static(b"new") });
    // Give the spawned broadcast task a chance to run.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
}

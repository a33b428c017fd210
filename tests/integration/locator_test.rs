//! Exercises `ControlServiceLocator` through the public `Locator` trait,
//! backed by a real fan-out engine and in-memory collaborators.

use convergence_control::connection::Locator;
use convergence_control::control::{ControlServiceLocator, spawn_fanout};
use convergence_control::core::errors::ProtocolError;
use convergence_control::core::model::{
    ClusterStateAggregator as _, Deployment, InMemoryClusterStateAggregator, InMemoryConfigurationStore,
};
use convergence_control::protocol::commands::Command as _;
use convergence_control::protocol::frame::Box as WireBox;
use convergence_control::protocol::{NodeState, TraceContext};
use std::sync::Arc;

use super::test_helpers::connected_handle;

#[tokio::test]
async fn node_state_before_registration_is_rejected() {
    let config_store = Arc::new(InMemoryConfigurationStore::new(Deployment::empty()));
    let aggregator = Arc::new(InMemoryClusterStateAggregator::new());
    let (fanout, _join) = spawn_fanout(config_store, aggregator.clone());
    let locator = ControlServiceLocator::new(fanout, aggregator);

    let mut body = WireBox::new();
    NodeState { state_changes: Vec::new(), trace: TraceContext(1) }
        .encode_request(&mut body)
        .unwrap();

    let err = locator.dispatch("NodeState", body).await.unwrap_err();
    assert!(matches!(err, ProtocolError::Internal(_)));
}

#[tokio::test]
async fn unknown_command_is_rejected() {
    let config_store = Arc::new(InMemoryConfigurationStore::new(Deployment::empty()));
    let aggregator = Arc::new(InMemoryClusterStateAggregator::new());
    let (fanout, _join) = spawn_fanout(config_store, aggregator.clone());
    let locator = ControlServiceLocator::new(fanout, aggregator);

    let err = locator.dispatch("Bogus", WireBox::new()).await.unwrap_err();
    assert!(matches!(err, ProtocolError::UnknownCommand(_)));
}

#[tokio::test]
async fn node_state_after_registration_is_applied() {
    let config_store = Arc::new(InMemoryConfigurationStore::new(Deployment::empty()));
    let aggregator = Arc::new(InMemoryClusterStateAggregator::new());
    let (fanout, _join) = spawn_fanout(config_store, aggregator.clone());
    let locator = ControlServiceLocator::new(fanout, aggregator.clone());

    let (handle, _conn_join) = connected_handle().await;
    locator.on_connected(handle).await;

    let mut body = WireBox::new();
    NodeState { state_changes: Vec::new(), trace: TraceContext(7) }
        .encode_request(&mut body)
        .unwrap();
    locator.dispatch("NodeState", body).await.unwrap();

    let state = aggregator.as_deployment_state().await;
    assert_eq!(state.generation, 1);
}

//! Exercises `AgentLocator` purely through the public `Locator` trait.

use async_trait::async_trait;
use bytes::Bytes;
use convergence_control::agent::{AgentLocator, ConvergenceAgent};
use convergence_control::connection::{ConnectionHandle, Locator};
use convergence_control::core::model::{Deployment, DeploymentState};
use convergence_control::protocol::commands::Command as _;
use convergence_control::protocol::frame::Box as WireBox;
use convergence_control::protocol::{ClusterStatus, NoOp, TraceContext};
use std::sync::Arc;
use std::sync::Mutex;

#[derive(Default)]
struct RecordingAgent {
    updates: Mutex<Vec<(Deployment, DeploymentState)>>,
}

#[async_trait]
impl ConvergenceAgent for RecordingAgent {
    async fn connected(&self, _endpoint: ConnectionHandle) {}
    async fn disconnected(&self) {}

    async fn cluster_updated(&self, configuration: Deployment, state: DeploymentState) {
        self.updates.lock().unwrap().push((configuration, state));
    }
}

#[tokio::test]
async fn cluster_status_is_forwarded_to_the_agent() {
    let agent = Arc::new(RecordingAgent::default());
    let locator = AgentLocator::new(agent.clone());

    let configuration = Deployment { generation: 7, payload: Bytes::from_static(b"cfg") };
    let state = DeploymentState {
        generation: 3,
        payload: Bytes::from_static(b"state"),
    };
    let request = ClusterStatus {
        configuration: configuration.clone(),
        state: state.clone(),
        trace: TraceContext(42),
    };
    let mut body = WireBox::new();
    request.encode_request(&mut body).unwrap();

    let response = locator.dispatch("ClusterStatus", body).await.unwrap();
    assert!(response.is_some());

    let updates = agent.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, configuration);
    assert_eq!(updates[0].1, state);
}

#[tokio::test]
async fn no_op_requires_no_response() {
    let agent = Arc::new(RecordingAgent::default());
    let locator = AgentLocator::new(agent);

    let mut body = WireBox::new();
    NoOp.encode_request(&mut body).unwrap();
    let response = locator.dispatch("NoOp", body).await.unwrap();
    assert!(response.is_none());
}

#[tokio::test]
async fn unknown_command_is_rejected() {
    let agent = Arc::new(RecordingAgent::default());
    let locator = AgentLocator::new(agent);

    let err = locator.dispatch("Bogus", WireBox::new()).await.unwrap_err();
    assert!(matches!(err, convergence_control::core::errors::ProtocolError::UnknownCommand(_)));
}

//! Regression test for the connect-time ordering guarantee: the agent's own
//! `Version` request must be answered before the connect-time `ClusterStatus`
//! push is written to the wire, even though the push is queued by a
//! different task (the fan-out engine) than the one answering `Version`.
//! Wires the real `ControlServiceLocator` + `ControlFanout` together, not a
//! stand-in, since the ordering guarantee lives in how those two interact
//! through `ConnectionHandler`.

use convergence_control::connection::ConnectionHandler;
use convergence_control::control::{ControlServiceLocator, spawn_fanout};
use convergence_control::core::model::{Deployment, InMemoryClusterStateAggregator, InMemoryConfigurationStore};
use convergence_control::protocol::commands::Command as _;
use convergence_control::protocol::envelope::{self, Envelope};
use convergence_control::protocol::frame::{Box as WireBox, BoxCodec};
use convergence_control::protocol::{PROTOCOL_MAJOR_VERSION, Version};
use convergence_control::server::stream::AnyStream;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::codec::Framed;

use super::test_helpers::addr;

#[tokio::test]
async fn version_response_precedes_the_connect_time_cluster_status_push() {
    let (agent_side, server_side) = tokio::io::duplex(64 * 1024);
    let mut agent_framed = Framed::new(agent_side, BoxCodec);

    // Write the agent's Version request before the server side even starts
    // running: a `DuplexStream` write completes without the peer polling, so
    // by the time the server's `ConnectionHandler::run_loop` first polls,
    // these bytes are already sitting in its read buffer.
    let mut version_body = WireBox::new();
    Version.encode_request(&mut version_body).unwrap();
    agent_framed
        .send(envelope::request_box(Version::NAME, Some(0), version_body))
        .await
        .unwrap();

    let config_store = Arc::new(InMemoryConfigurationStore::new(Deployment::empty()));
    let aggregator = Arc::new(InMemoryClusterStateAggregator::new());
    let (fanout, _fanout_join) = spawn_fanout(config_store, aggregator.clone());
    let locator = Arc::new(ControlServiceLocator::new(fanout, aggregator));

    let (shutdown_tx, _rx) = broadcast::channel::<()>(1);
    let (mut handler, _handle) =
        ConnectionHandler::new(AnyStream::from_duplex(server_side), addr(), locator, shutdown_tx.subscribe());
    let server_join = tokio::spawn(async move {
        let _ = handler.run().await;
    });

    let first = envelope::parse(agent_framed.next().await.unwrap().unwrap()).unwrap();
    match first {
        Envelope::Answer { ask, body } => {
            assert_eq!(ask, 0);
            let response = Version::decode_response(&body).unwrap();
            assert_eq!(response.major, PROTOCOL_MAJOR_VERSION);
        }
        other => panic!("expected the Version answer first, got {other:?}"),
    }

    let second = envelope::parse(agent_framed.next().await.unwrap().unwrap()).unwrap();
    match second {
        Envelope::Request { command, .. } => assert_eq!(command, "ClusterStatus"),
        other => panic!("expected the connect-time ClusterStatus push second, got {other:?}"),
    }

    server_join.abort();
}

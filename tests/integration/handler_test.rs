//! Drives `ConnectionHandler` over a loopback `duplex` stream with a minimal
//! `Locator`, exercised purely through `ConnectionHandle::call`.

use async_trait::async_trait;
use convergence_control::connection::{ConnectionHandler, Locator};
use convergence_control::core::errors::ProtocolError;
use convergence_control::protocol::commands::Command as _;
use convergence_control::protocol::frame::Box as WireBox;
use convergence_control::protocol::{PROTOCOL_MAJOR_VERSION, Version, VersionResponse};
use convergence_control::server::stream::AnyStream;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::test_helpers::addr;

struct EchoLocator;

#[async_trait]
impl Locator for EchoLocator {
    async fn dispatch(&self, command: &str, _body: WireBox) -> Result<Option<WireBox>, ProtocolError> {
        match command {
            "Version" => {
                let mut resp = WireBox::new();
                Version::encode_response(&VersionResponse { major: PROTOCOL_MAJOR_VERSION }, &mut resp)?;
                Ok(Some(resp))
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

#[tokio::test]
async fn version_call_round_trips_over_a_loopback_stream() {
    let (agent_side, server_side) = tokio::io::duplex(64 * 1024);
    let (shutdown_tx, _rx) = broadcast::channel::<()>(1);

    let (mut handler, _handle) = ConnectionHandler::new(
        AnyStream::from_duplex(server_side),
        addr(),
        Arc::new(EchoLocator),
        shutdown_tx.subscribe(),
    );
    let server_join = tokio::spawn(async move {
        let _ = handler.run().await;
    });

    let (mut agent_handler, agent_handle) = ConnectionHandler::new(
        AnyStream::from_duplex(agent_side),
        addr(),
        Arc::new(EchoLocator),
        shutdown_tx.subscribe(),
    );
    let agent_join = tokio::spawn(async move {
        let _ = agent_handler.run().await;
    });

    let response = agent_handle.call(Version).await.unwrap();
    assert_eq!(response.major, PROTOCOL_MAJOR_VERSION);

    server_join.abort();
    agent_join.abort();
}

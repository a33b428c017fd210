//! Shared helpers for the crate's integration tests: a loopback `duplex`
//! stream wired through the real `ConnectionHandler`, for tests that need a
//! live `ConnectionHandle` without binding an actual TCP socket.

use async_trait::async_trait;
use convergence_control::connection::{ConnectionHandle, ConnectionHandler, Locator};
use convergence_control::core::errors::ProtocolError;
use convergence_control::protocol::frame::Box as WireBox;
use convergence_control::server::stream::AnyStream;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;

pub fn addr() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// A `Locator` that answers every dispatch with an empty body, used by tests
/// that only care about the fan-out engine's own bookkeeping, not command
/// semantics.
pub struct SinkLocator;

#[async_trait]
impl Locator for SinkLocator {
    async fn dispatch(&self, _command: &str, _body: WireBox) -> Result<Option<WireBox>, ProtocolError> {
        Ok(Some(WireBox::new()))
    }
}

/// Spawns a `ConnectionHandler` over an in-memory duplex pipe driven by
/// `SinkLocator`, and returns its outbound `ConnectionHandle` plus the
/// handler's running task.
pub async fn connected_handle() -> (ConnectionHandle, tokio::task::JoinHandle<()>) {
    let (_peer, ours) = tokio::io::duplex(64 * 1024);
    let (shutdown_tx, _rx) = broadcast::channel::<()>(1);
    let (mut handler, handle) = ConnectionHandler::new(
        AnyStream::from_duplex(ours),
        addr(),
        Arc::new(SinkLocator),
        shutdown_tx.subscribe(),
    );
    let join = tokio::spawn(async move {
        let _ = handler.run().await;
    });
    (handle, join)
}

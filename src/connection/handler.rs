// src/connection/handler.rs

//! The connection endpoint: drives a single framed
//! connection's read loop, dispatches incoming requests to a `Locator`,
//! and answers outstanding `call()`s issued by whoever holds this
//! connection's `ConnectionHandle`. Generic over `Locator` so the same
//! machinery serves both the control service's agent-facing listener and
//! the agent's control-facing client, each supplying its own locator
//! (`ControlServiceLocator` / `AgentLocator`).

use crate::core::errors::{ProtocolError, is_normal_disconnect};
use crate::protocol::envelope::{self, Envelope};
use crate::protocol::frame::{Box as WireBox, BoxCodec};
use crate::server::stream::AnyStream;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

/// Handles one connection's incoming requests. `dispatch` returns `Ok(Some(box))`
/// for a command that produces an answer, `Ok(None)` for one that doesn't
/// (e.g. `NoOp`), and `Err` to have the connection endpoint send back an
/// AMP-style error response (or, for answer-less commands, just log it).
#[async_trait]
pub trait Locator: Send + Sync {
    async fn dispatch(&self, command: &str, body: WireBox) -> Result<Option<WireBox>, ProtocolError>;
    async fn on_connected(&self, _handle: ConnectionHandle) {}
    async fn on_disconnected(&self) {}
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<WireBox, ProtocolError>>>>>;

/// A cheaply-cloneable handle to a connection's outbound side: issue
/// `call()`s and fire-and-forget sends without holding the connection's read
/// loop hostage. This is what `ControlFanout` stores per connection (as part
/// of its `ConnectionRecord`) and what `Pinger` sends heartbeats through.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub peer_addr: SocketAddr,
    outbound_tx: mpsc::UnboundedSender<WireBox>,
    pending: PendingMap,
    next_ask: Arc<AtomicU64>,
}

impl ConnectionHandle {
    /// Sends `cmd` and, if it requires an answer, awaits it. Returns
    /// `Err(ProtocolError::ConnectionLost)` if the connection's write side
    /// or read loop has already gone away.
    pub async fn call<C: crate::protocol::Command>(&self, cmd: C) -> Result<C::Response, ProtocolError> {
        let mut body = WireBox::new();
        cmd.encode_request(&mut body)?;
        if !C::REQUIRES_ANSWER {
            self.send_no_answer(C::NAME, body)?;
            return C::decode_response(&WireBox::new());
        }
        let response_box = self.call_raw(C::NAME, body).await?;
        C::decode_response(&response_box)
    }

    /// Sends a command that requires no answer, without going through a
    /// typed `Command` — used by the control fan-out engine when the box
    /// has already been built with pre-encoded (cached) payloads.
    pub fn send_no_answer(&self, command: &str, body: WireBox) -> Result<(), ProtocolError> {
        let frame = envelope::request_box(command, None, body);
        self.outbound_tx.send(frame).map_err(|_| ProtocolError::ConnectionLost)
    }

    /// Registers a pending answer and enqueues `body` under `command` onto
    /// the outbound channel synchronously, returning a receiver for the
    /// answer rather than awaiting it here. Splitting this out of `call_raw`
    /// lets a caller observe that the frame has actually been queued (not
    /// just that the call to send it has started) before doing anything
    /// else — the control fan-out engine uses this to hold back a new
    /// connection's `Register` reply until its initial `ClusterStatus` push
    /// is already sitting in `outbound_tx`, ahead of anything
    /// `ConnectionHandler::run_loop` could otherwise send first.
    pub fn send_raw_awaiting(
        &self,
        command: &str,
        body: WireBox,
    ) -> Result<oneshot::Receiver<Result<WireBox, ProtocolError>>, ProtocolError> {
        let ask = self.next_ask.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(ask, tx);

        let frame = envelope::request_box(command, Some(ask), body);
        if self.outbound_tx.send(frame).is_err() {
            self.pending.lock().remove(&ask);
            return Err(ProtocolError::ConnectionLost);
        }
        Ok(rx)
    }

    /// Sends a pre-built request body under `command` and awaits its
    /// answer, without encoding/decoding through a typed `Command`. The
    /// control fan-out engine uses this so it can build `ClusterStatus`
    /// boxes from already-cache-encoded bytes (see `cache::EncodingCache`)
    /// instead of re-serializing per connection.
    pub async fn call_raw(&self, command: &str, body: WireBox) -> Result<WireBox, ProtocolError> {
        let rx = self.send_raw_awaiting(command, body)?;
        match rx.await {
            Ok(Ok(response_box)) => Ok(response_box),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProtocolError::ConnectionLost),
        }
    }

    /// Exposes the raw outbound sender for callers (the `Pinger`) that send
    /// pre-built frames rather than typed `Command`s.
    pub fn outbound(&self) -> mpsc::UnboundedSender<WireBox> {
        self.outbound_tx.clone()
    }
}

/// Drives the read/write loop for a single connection. Owns the framed
/// stream outright (never shared across tasks), matching the single-owner
/// discipline the concurrency model calls for.
pub struct ConnectionHandler<L: Locator> {
    framed: Framed<AnyStream, BoxCodec>,
    outbound_rx: mpsc::UnboundedReceiver<WireBox>,
    handle: ConnectionHandle,
    locator: Arc<L>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl<L: Locator + 'static> ConnectionHandler<L> {
    pub fn new(
        socket: AnyStream,
        peer_addr: SocketAddr,
        locator: Arc<L>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> (Self, ConnectionHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle {
            peer_addr,
            outbound_tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_ask: Arc::new(AtomicU64::new(0)),
        };
        let this = Self {
            framed: Framed::new(socket, BoxCodec),
            outbound_rx,
            handle: handle.clone(),
            locator,
            shutdown_rx,
        };
        (this, handle)
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Runs until the peer disconnects, a protocol error occurs, or shutdown
    /// is signaled. Always invokes `Locator::on_disconnected` exactly once
    /// before returning, even on error paths.
    pub async fn run(&mut self) -> Result<(), ProtocolError> {
        self.locator.on_connected(self.handle.clone()).await;
        let result = self.run_loop().await;
        self.locator.on_disconnected().await;
        result
    }

    async fn run_loop(&mut self) -> Result<(), ProtocolError> {
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    debug!("connection {} received shutdown signal", self.handle.peer_addr);
                    return Ok(());
                }

                // Checked ahead of the outbound branch: an already-arrived
                // inbound frame (most importantly, the peer's own Version
                // request) must be dispatched and answered before a frame
                // already queued on `outbound_tx` gets its turn, so a
                // connect-time push (C7's initial `ClusterStatus`) can never
                // win the wire race against the answer to a request the peer
                // itself issued.
                incoming = self.framed.next() => {
                    match incoming {
                        Some(Ok(raw)) => self.handle_incoming(raw).await?,
                        Some(Err(e)) => {
                            if is_normal_disconnect(&e) {
                                debug!("connection {} closed by peer: {e}", self.handle.peer_addr);
                            } else {
                                warn!("connection {} error: {e}", self.handle.peer_addr);
                            }
                            return Ok(());
                        }
                        None => return Ok(()),
                    }
                }

                outbound = self.outbound_rx.recv() => {
                    match outbound {
                        Some(frame) => self.framed.send(frame).await?,
                        None => {
                            // All handles dropped; nothing left to write, but
                            // the peer may still be sending us requests.
                        }
                    }
                }
            }
        }
    }

    async fn handle_incoming(&mut self, raw: WireBox) -> Result<(), ProtocolError> {
        match envelope::parse(raw)? {
            Envelope::Request { command, ask, body } => {
                let dispatch_result = self.locator.dispatch(&command, body).await;
                if let Some(ask) = ask {
                    let response_frame = match dispatch_result {
                        Ok(Some(response_body)) => envelope::answer_box(ask, response_body),
                        Ok(None) => envelope::answer_box(ask, WireBox::new()),
                        Err(e) => envelope::error_box(ask, &e.to_string()),
                    };
                    self.framed.send(response_frame).await?;
                } else if let Err(e) = dispatch_result {
                    debug!("unanswered command '{command}' failed: {e}");
                }
            }
            Envelope::Answer { ask, body } => {
                if let Some(tx) = self.handle.pending.lock().remove(&ask) {
                    let _ = tx.send(Ok(body));
                }
            }
            Envelope::Error { ask, message } => {
                if let Some(tx) = self.handle.pending.lock().remove(&ask) {
                    let _ = tx.send(Err(ProtocolError::Internal(message)));
                }
            }
        }
        Ok(())
    }
}

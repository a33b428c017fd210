// src/pinger.rs

//! The pinger: sends a periodic `NoOp` over a connection to
//! keep it from being reaped as idle by middleboxes, and to surface a dead
//! peer via a write failure sooner than the read side otherwise would.
//! The first tick fires one interval after `start`, not immediately, which
//! `tokio::time::interval` does not do by default, so `run` explicitly
//! consumes the immediate first tick before entering the loop.

use crate::protocol::NoOp;
use crate::protocol::commands::Command as _;
use crate::protocol::envelope;
use crate::protocol::frame::Box as WireBox;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Sends `NoOp` pings on `interval` onto `outbound` until dropped or
/// explicitly stopped. `NoOp::REQUIRES_ANSWER` is `false`, so it is sent
/// without an `_ask` key and the connection endpoint never waits on a
/// response for it.
pub struct Pinger {
    handle: JoinHandle<()>,
}

impl Pinger {
    pub fn start(outbound: mpsc::UnboundedSender<WireBox>, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Consume the immediate first tick: `tokio::time::interval` fires
            // at t=0 by default, but the original `LoopingCall(now=False)`
            // semantics wait a full interval before the first ping.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let ping = NoOp;
                let mut body = WireBox::new();
                if let Err(e) = ping.encode_request(&mut body) {
                    debug!("pinger failed to encode NoOp, stopping: {e}");
                    break;
                }
                let frame = envelope::request_box("NoOp", None, body);
                if outbound.send(frame).is_err() {
                    debug!("pinger's outbound channel closed, stopping");
                    break;
                }
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for Pinger {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

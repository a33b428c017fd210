// src/connection/mod.rs

//! The connection endpoint: the framed read/write loop shared
//! by both the control service's agent-facing listener and the agent's
//! control-facing client.

mod handler;

pub use handler::{ConnectionHandle, ConnectionHandler, Locator};

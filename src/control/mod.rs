// src/control/mod.rs

//! The control service's half of the crate: the fan-out engine that
//! broadcasts cluster state to connected agents (C7) and the `Locator` that
//! answers agents' incoming requests (part of C4/C6).

mod fanout;
mod locator;

pub use fanout::{ConnectionId, ConnectionRecord, FanoutHandle, spawn as spawn_fanout};
pub use locator::ControlServiceLocator;

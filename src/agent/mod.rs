// src/agent/mod.rs

//! The agent side of the crate: the agent dispatcher and the
//! agent's service lifecycle (the agent half of C9) — dialing the control
//! service, performing the version handshake, and forwarding `ClusterStatus`
//! updates into a user-supplied `ConvergenceAgent`.

mod config;
mod dispatcher;
mod service;

pub use config::AgentConfig;
pub use dispatcher::{AgentLocator, ConvergenceAgent};
pub use service::{AgentService, AgentServiceHandle};

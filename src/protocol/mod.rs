// src/protocol/mod.rs

//! The agent wire protocol: frame codec (C1), command set (C3), and the
//! envelope fields that tie requests to answers.

pub mod commands;
pub mod envelope;
pub mod frame;

pub use commands::{
    Big, Command, ClusterStatus, NoOp, PROTOCOL_MAJOR_VERSION, NodeState, Serializable,
    TraceContext, Version, VersionResponse, WireValue,
};
pub use envelope::Envelope;
pub use frame::{Box, BoxCodec, MAX_VALUE_LENGTH};

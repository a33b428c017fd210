// src/core/errors.rs

//! Defines the primary error type for the control-plane protocol.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures while speaking the
/// agent protocol or running the control service.
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("frame exceeds maximum box value length")]
    MalformedFrame,

    #[error("argument '{0}' missing or of the wrong shape in box")]
    ArgumentTypeMismatch(String),

    #[error("peer reported protocol major version {peer}, expected {expected}")]
    VersionMismatch { expected: u32, peer: u32 },

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("send to agent failed transiently: {0}")]
    TransientSendFailure(String),

    #[error("connection lost")]
    ConnectionLost,

    #[error("internal error: {0}")]
    Internal(String),
}

impl PartialEq for ProtocolError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ProtocolError::Io(a), ProtocolError::Io(b)) => a.to_string() == b.to_string(),
            (ProtocolError::MalformedFrame, ProtocolError::MalformedFrame) => true,
            (ProtocolError::ArgumentTypeMismatch(a), ProtocolError::ArgumentTypeMismatch(b)) => {
                a == b
            }
            (
                ProtocolError::VersionMismatch { expected: e1, peer: p1 },
                ProtocolError::VersionMismatch { expected: e2, peer: p2 },
            ) => e1 == e2 && p1 == p2,
            (ProtocolError::UnknownCommand(a), ProtocolError::UnknownCommand(b)) => a == b,
            (ProtocolError::TransientSendFailure(a), ProtocolError::TransientSendFailure(b)) => {
                a == b
            }
            (ProtocolError::ConnectionLost, ProtocolError::ConnectionLost) => true,
            (ProtocolError::Internal(a), ProtocolError::Internal(b)) => a == b,
            _ => false,
        }
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        ProtocolError::Io(Arc::new(e))
    }
}

impl From<bincode::error::EncodeError> for ProtocolError {
    fn from(e: bincode::error::EncodeError) -> Self {
        ProtocolError::Internal(format!("bincode encode error: {e}"))
    }
}

impl From<bincode::error::DecodeError> for ProtocolError {
    fn from(e: bincode::error::DecodeError) -> Self {
        ProtocolError::ArgumentTypeMismatch(format!("bincode decode error: {e}"))
    }
}

/// True when the underlying IO error is a routine peer disconnect rather than
/// a genuine fault worth logging at `warn`.
pub fn is_normal_disconnect(e: &ProtocolError) -> bool {
    matches!(e, ProtocolError::Io(arc_err) if matches!(
        arc_err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionAborted
    ))
}

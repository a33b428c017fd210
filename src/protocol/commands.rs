// src/protocol/commands.rs

//! The control/agent command set: `Version`, `NoOp`,
//! `ClusterStatus`, `NodeState`. Values that may exceed a single box value's
//! size limit use the `Big<T>`/`WireValue` pair below instead of a class
//! hierarchy — static dispatch rather than a runtime locator table.

use crate::core::errors::ProtocolError;
use crate::core::model::{ClusterStateChange, Deployment, DeploymentState, wire_decode, wire_encode};
use crate::protocol::frame::{Box, MAX_VALUE_LENGTH};
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// The value every `Version` responder returns for `major`. A mismatch is
/// treated as fatal by the agent dispatcher (`ProtocolError::VersionMismatch`).
pub const PROTOCOL_MAJOR_VERSION: u32 = 1;

/// A value that can be flattened to and parsed back from a single wire
/// blob. `Big<T>` always chunks that blob across `name.0`, `name.1`, ...
/// keys, regardless of size; this trait only needs to produce the single
/// (pre-chunking) blob, the Rust analogue of AMP's `Argument`.
pub trait WireValue: Sized {
    fn encode(&self) -> Result<Bytes, ProtocolError>;
    fn decode(bytes: &[u8]) -> Result<Self, ProtocolError>;
}

/// Wraps any `Serialize + DeserializeOwned` value as a `WireValue` using the
/// crate's bincode-backed wire format.
pub struct Serializable<T>(pub T);

impl<T: Serialize + DeserializeOwned> WireValue for Serializable<T> {
    fn encode(&self) -> Result<Bytes, ProtocolError> {
        wire_encode(&self.0)
    }

    fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Serializable(wire_decode(bytes)?))
    }
}

/// Splits a value across indexed keys ("name.0", "name.1", ...) so that no
/// individual box value exceeds `MAX_VALUE_LENGTH`, unconditionally — the
/// same trick AMP's `Big` argument wrapper uses to stay within its
/// historical per-value size limit. Always emits at least one chunk,
/// including for an empty value (a lone empty `"name.0"`); never leaves a
/// bare `"name"` key.
pub struct Big<T>(pub T);

impl<T: WireValue> Big<T> {
    pub fn to_box(&self, name: &str, dst: &mut Box) -> Result<(), ProtocolError> {
        let full = self.0.encode()?;
        if full.is_empty() {
            // `full.chunks(MAX_VALUE_LENGTH)` yields zero chunks for an
            // empty value, which would leave no "<name>.0" key at all and
            // make `from_box` mistake a valid empty value for a missing one.
            // Emit a single empty chunk so the law "⌈L/MAX_VALUE_LENGTH⌉
            // chunks" still holds for `L=0` (one chunk, not zero).
            dst.insert(format!("{name}.0"), Bytes::new());
            return Ok(());
        }
        for (i, chunk) in full.chunks(MAX_VALUE_LENGTH).enumerate() {
            dst.insert(format!("{name}.{i}"), Bytes::copy_from_slice(chunk));
        }
        Ok(())
    }

    pub fn from_box(name: &str, src: &Box) -> Result<T, ProtocolError> {
        let mut assembled = BytesMut::new();
        let mut index = 0usize;
        loop {
            let key = format!("{name}.{index}");
            match src.get(&key) {
                Some(chunk) => {
                    assembled.extend_from_slice(chunk);
                    index += 1;
                }
                None => break,
            }
        }
        if index == 0 {
            return Err(ProtocolError::ArgumentTypeMismatch(name.to_string()));
        }
        T::decode(&assembled)
    }
}

fn get_u32(src: &Box, name: &str) -> Result<u32, ProtocolError> {
    let bytes = src
        .get(name)
        .ok_or_else(|| ProtocolError::ArgumentTypeMismatch(name.to_string()))?;
    let arr: [u8; 4] = bytes
        .as_ref()
        .try_into()
        .map_err(|_| ProtocolError::ArgumentTypeMismatch(name.to_string()))?;
    Ok(u32::from_be_bytes(arr))
}

fn put_u32(dst: &mut Box, name: &str, value: u32) {
    dst.insert(name.to_string(), Bytes::copy_from_slice(&value.to_be_bytes()));
}

/// An opaque correlation token carried alongside `ClusterStatus`/`NodeState`
/// requests, letting the receiving side resume a `tracing` span under the
/// same logical operation the sender started it under. The Rust realization
/// of `_EliotActionArgument`; see DESIGN.md for how this avoids the unbound
/// `action` variable bug present in the original broadcast loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceContext(pub u64);

impl TraceContext {
    const KEY: &'static str = "eliot_context";

    pub fn to_box(self, dst: &mut Box) {
        put_u32(dst, Self::KEY, self.0 as u32);
        dst.insert(
            format!("{}.hi", Self::KEY),
            Bytes::copy_from_slice(&((self.0 >> 32) as u32).to_be_bytes()),
        );
    }

    pub fn from_box(src: &Box) -> Result<Self, ProtocolError> {
        let lo = get_u32(src, Self::KEY)? as u64;
        let hi = get_u32(src, &format!("{}.hi", Self::KEY))? as u64;
        Ok(TraceContext((hi << 32) | lo))
    }
}

/// A command exchanged over the agent protocol. Each implementor knows how
/// to encode/decode its own request and response boxes; dispatch between
/// commands is a static match in `connection::Locator`, not a runtime
/// registry, matching the design notes' "static dispatch table" guidance.
pub trait Command: Sized {
    const NAME: &'static str;
    const REQUIRES_ANSWER: bool = true;
    type Response;

    fn encode_request(&self, dst: &mut Box) -> Result<(), ProtocolError>;
    fn decode_request(src: &Box) -> Result<Self, ProtocolError>;
    fn encode_response(response: &Self::Response, dst: &mut Box) -> Result<(), ProtocolError>;
    fn decode_response(src: &Box) -> Result<Self::Response, ProtocolError>;
}

/// Queries the protocol major version the peer speaks.
pub struct Version;

pub struct VersionResponse {
    pub major: u32,
}

impl Command for Version {
    const NAME: &'static str = "Version";
    type Response = VersionResponse;

    fn encode_request(&self, _dst: &mut Box) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn decode_request(_src: &Box) -> Result<Self, ProtocolError> {
        Ok(Version)
    }

    fn encode_response(response: &Self::Response, dst: &mut Box) -> Result<(), ProtocolError> {
        put_u32(dst, "major", response.major);
        Ok(())
    }

    fn decode_response(src: &Box) -> Result<Self::Response, ProtocolError> {
        Ok(VersionResponse { major: get_u32(src, "major")? })
    }
}

/// A heartbeat with no payload and no response, sent by the `Pinger`.
pub struct NoOp;

impl Command for NoOp {
    const NAME: &'static str = "NoOp";
    const REQUIRES_ANSWER: bool = false;
    type Response = ();

    fn encode_request(&self, _dst: &mut Box) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn decode_request(_src: &Box) -> Result<Self, ProtocolError> {
        Ok(NoOp)
    }

    fn encode_response(_response: &Self::Response, _dst: &mut Box) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn decode_response(_src: &Box) -> Result<Self::Response, ProtocolError> {
        Ok(())
    }
}

/// Sent from the control service to an agent: the full desired configuration
/// and the full observed cluster state, each `Big`-wrapped since either may
/// exceed a single box value's size limit.
pub struct ClusterStatus {
    pub configuration: Deployment,
    pub state: DeploymentState,
    pub trace: TraceContext,
}

impl Command for ClusterStatus {
    const NAME: &'static str = "ClusterStatus";
    type Response = ();

    fn encode_request(&self, dst: &mut Box) -> Result<(), ProtocolError> {
        Big(Serializable(self.configuration.clone())).to_box("configuration", dst)?;
        Big(Serializable(self.state.clone())).to_box("state", dst)?;
        self.trace.to_box(dst);
        Ok(())
    }

    fn decode_request(src: &Box) -> Result<Self, ProtocolError> {
        let Serializable(configuration) = Big::<Serializable<Deployment>>::from_box("configuration", src)?;
        let Serializable(state) = Big::<Serializable<DeploymentState>>::from_box("state", src)?;
        let trace = TraceContext::from_box(src)?;
        Ok(ClusterStatus { configuration, state, trace })
    }

    fn encode_response(_response: &Self::Response, _dst: &mut Box) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn decode_response(_src: &Box) -> Result<Self::Response, ProtocolError> {
        Ok(())
    }
}

/// Sent from an agent to the control service: the set of state changes it
/// observed locally since its last report.
pub struct NodeState {
    pub state_changes: Vec<ClusterStateChange>,
    pub trace: TraceContext,
}

impl Command for NodeState {
    const NAME: &'static str = "NodeState";
    type Response = ();

    fn encode_request(&self, dst: &mut Box) -> Result<(), ProtocolError> {
        Big(Serializable(self.state_changes.clone())).to_box("state_changes", dst)?;
        self.trace.to_box(dst);
        Ok(())
    }

    fn decode_request(src: &Box) -> Result<Self, ProtocolError> {
        let Serializable(state_changes) =
            Big::<Serializable<Vec<ClusterStateChange>>>::from_box("state_changes", src)?;
        let trace = TraceContext::from_box(src)?;
        Ok(NodeState { state_changes, trace })
    }

    fn encode_response(_response: &Self::Response, _dst: &mut Box) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn decode_response(_src: &Box) -> Result<Self::Response, ProtocolError> {
        Ok(())
    }
}

// src/protocol/envelope.rs

//! Reserved keys that turn a bare `Box` into a request, response, or error,
//! the Rust analogue of AMP's `_command`/`_ask`/`_answer`/`_error` reserved
//! keys. `Command` implementations (see `protocol::commands`) only ever see
//! the command-specific keys; the connection endpoint (C4) strips/attaches
//! these reserved keys at the boundary.

use crate::core::errors::ProtocolError;
use crate::protocol::frame::Box;
use bytes::Bytes;

const COMMAND_KEY: &str = "_command";
const ASK_KEY: &str = "_ask";
const ANSWER_KEY: &str = "_answer";
const ERROR_KEY: &str = "_error";

/// A box with its AMP-style envelope fields already parsed out. `ask` is
/// `None` for commands sent with `REQUIRES_ANSWER = false` (e.g. `NoOp`).
#[derive(Debug)]
pub enum Envelope {
    Request { command: String, ask: Option<u64>, body: Box },
    Answer { ask: u64, body: Box },
    Error { ask: u64, message: String },
}

fn encode_id(id: u64) -> Bytes {
    Bytes::copy_from_slice(&id.to_be_bytes())
}

fn decode_id(bytes: &Bytes) -> Result<u64, ProtocolError> {
    let arr: [u8; 8] = bytes
        .as_ref()
        .try_into()
        .map_err(|_| ProtocolError::MalformedFrame)?;
    Ok(u64::from_be_bytes(arr))
}

/// Builds the wire box for a request: `body` plus `_command` and, if an
/// answer is expected, `_ask`.
pub fn request_box(command: &str, ask: Option<u64>, mut body: Box) -> Box {
    body.insert(COMMAND_KEY.to_string(), Bytes::copy_from_slice(command.as_bytes()));
    if let Some(ask) = ask {
        body.insert(ASK_KEY.to_string(), encode_id(ask));
    }
    body
}

/// Builds the wire box for a successful response to `ask`.
pub fn answer_box(ask: u64, mut body: Box) -> Box {
    body.insert(ANSWER_KEY.to_string(), encode_id(ask));
    body
}

/// Builds the wire box for an error response to `ask`.
pub fn error_box(ask: u64, message: &str) -> Box {
    let mut body = Box::new();
    body.insert(ANSWER_KEY.to_string(), encode_id(ask));
    body.insert(ERROR_KEY.to_string(), Bytes::copy_from_slice(message.as_bytes()));
    body
}

/// Classifies an incoming box as a request, a successful answer, or an
/// error, stripping the reserved keys so the remaining `body` can be handed
/// straight to a `Command::decode_request`/`decode_response`.
pub fn parse(mut raw: Box) -> Result<Envelope, ProtocolError> {
    if let Some(answer_bytes) = raw.remove(ANSWER_KEY) {
        let ask = decode_id(&answer_bytes)?;
        if let Some(message) = raw.remove(ERROR_KEY) {
            let message = String::from_utf8(message.to_vec()).map_err(|_| ProtocolError::MalformedFrame)?;
            return Ok(Envelope::Error { ask, message });
        }
        return Ok(Envelope::Answer { ask, body: raw });
    }

    let command_bytes = raw
        .remove(COMMAND_KEY)
        .ok_or(ProtocolError::MalformedFrame)?;
    let command = String::from_utf8(command_bytes.to_vec()).map_err(|_| ProtocolError::MalformedFrame)?;
    let ask = match raw.remove(ASK_KEY) {
        Some(bytes) => Some(decode_id(&bytes)?),
        None => None,
    };
    Ok(Envelope::Request { command, ask, body: raw })
}

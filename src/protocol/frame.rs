// src/protocol/frame.rs

//! The wire codec: a length-prefixed frame whose body is a
//! key/value "box". Implemented as a `tokio_util::codec::{Encoder, Decoder}`
//! pair, so it plugs into `tokio_util::codec::Framed` unchanged.

use crate::core::errors::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;
use tokio_util::codec::{Decoder, Encoder};

/// The historical AMP constant: no single value within a box may exceed this
/// many bytes. Values larger than this must be split by `Big` (see
/// `protocol::commands`) into multiple indexed keys before being placed in a
/// box.
pub const MAX_VALUE_LENGTH: usize = 65_535;

/// A decoded or to-be-encoded frame body: an ordered key/value map. Ordered
/// (`BTreeMap`, not `HashMap`) so that `Big`'s indexed keys ("name.0",
/// "name.1", ...) reassemble deterministically regardless of the encoder's
/// iteration order.
pub type Box = BTreeMap<String, Bytes>;

const LENGTH_PREFIX_BYTES: usize = 4;
const KEY_LEN_BYTES: usize = 2;
const VALUE_LEN_BYTES: usize = 4;

/// A safety cap on total frame size, distinct from `MAX_VALUE_LENGTH` (which
/// bounds a single value before `Big`-splitting, not the frame as a whole).
/// Guards against a corrupt or hostile peer claiming an enormous length
/// prefix and exhausting memory while we wait for the rest of the frame.
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct BoxCodec;

impl Encoder<Box> for BoxCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Box, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut body = BytesMut::new();
        for (key, value) in &item {
            if key.len() > u16::MAX as usize {
                return Err(ProtocolError::MalformedFrame);
            }
            if value.len() > u32::MAX as usize {
                return Err(ProtocolError::MalformedFrame);
            }
            body.put_u16(key.len() as u16);
            body.put_slice(key.as_bytes());
            body.put_u32(value.len() as u32);
            body.put_slice(value);
        }
        if body.len() > MAX_FRAME_BYTES {
            return Err(ProtocolError::MalformedFrame);
        }
        dst.reserve(LENGTH_PREFIX_BYTES + body.len());
        dst.put_u32(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}

impl Decoder for BoxCodec {
    type Item = Box;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_BYTES {
            return Ok(None);
        }
        let body_len = u32::from_be_bytes(src[..LENGTH_PREFIX_BYTES].try_into().unwrap()) as usize;
        if body_len > MAX_FRAME_BYTES {
            return Err(ProtocolError::MalformedFrame);
        }
        if src.len() < LENGTH_PREFIX_BYTES + body_len {
            src.reserve(LENGTH_PREFIX_BYTES + body_len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_BYTES);
        let mut body = src.split_to(body_len);

        let mut result = Box::new();
        while body.has_remaining() {
            if body.remaining() < KEY_LEN_BYTES {
                return Err(ProtocolError::MalformedFrame);
            }
            let key_len = body.get_u16() as usize;
            if body.remaining() < key_len {
                return Err(ProtocolError::MalformedFrame);
            }
            let key_bytes = body.split_to(key_len);
            let key = String::from_utf8(key_bytes.to_vec())
                .map_err(|_| ProtocolError::MalformedFrame)?;

            if body.remaining() < VALUE_LEN_BYTES {
                return Err(ProtocolError::MalformedFrame);
            }
            let value_len = body.get_u32() as usize;
            if body.remaining() < value_len {
                return Err(ProtocolError::MalformedFrame);
            }
            let value = body.split_to(value_len).freeze();
            result.insert(key, value);
        }

        Ok(Some(result))
    }
}

use bytes::{BufMut, Bytes, BytesMut};
use convergence_control::protocol::frame::{Box, BoxCodec};
use tokio_util::codec::{Decoder, Encoder};

fn roundtrip(b: Box) -> Box {
    let mut codec = BoxCodec;
    let mut buf = BytesMut::new();
    codec.encode(b, &mut buf).unwrap();
    codec.decode(&mut buf).unwrap().unwrap()
}

#[test]
fn empty_box_roundtrips() {
    assert_eq!(roundtrip(Box::new()), Box::new());
}

#[test]
fn multi_key_box_roundtrips_in_order() {
    let mut b = Box::new();
    b.insert("_command".to_string(), Bytes::from_static(b"NodeState"));
    b.insert("state_changes".to_string(), Bytes::from_static(b"payload"));
    let decoded = roundtrip(b.clone());
    assert_eq!(decoded, b);
}

#[test]
fn decoder_waits_for_full_frame() {
    let mut codec = BoxCodec;
    let mut b = Box::new();
    b.insert("k".to_string(), Bytes::from_static(b"v"));
    let mut full = BytesMut::new();
    codec.encode(b, &mut full).unwrap();

    let mut partial = BytesMut::from(&full[..full.len() - 1]);
    assert!(codec.decode(&mut partial).unwrap().is_none());

    let mut remaining = BytesMut::new();
    remaining.put_u8(full[full.len() - 1]);
    partial.unsplit(remaining);
    assert!(codec.decode(&mut partial).unwrap().is_some());
}

#[test]
fn oversized_length_prefix_is_rejected() {
    let mut codec = BoxCodec;
    let mut buf = BytesMut::new();
    buf.put_u32(u32::MAX);
    assert!(codec.decode(&mut buf).is_err());
}

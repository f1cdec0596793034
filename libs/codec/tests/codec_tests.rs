//! # Header Codec Integration Tests
//!
//! Verifies the public API the stream crate relies on:
//! - Round-trip of heads and payloads through the inline header
//! - Wire compatibility with independently produced buffers
//! - Rejection of malformed buffers without panics

use bytes::Bytes;
use dgram_codec::{
    decode_bytes, decode_message, encode_head, encode_message, AddressFamily, MessageHead,
    ProtocolError, FIXED_HEADER_LEN,
};
use proptest::prelude::*;

fn family_strategy() -> impl Strategy<Value = AddressFamily> {
    prop_oneof![Just(AddressFamily::IPv4), Just(AddressFamily::IPv6)]
}

proptest! {
    #[test]
    fn prop_round_trip(
        family in family_strategy(),
        port in any::<u16>(),
        address in "[0-9a-f:.]{0,250}",
        payload in proptest::collection::vec(any::<u8>(), 0..2048),
    ) {
        let head = MessageHead::new(payload.len() as u16, family, port, address.clone());
        let framed = encode_message(&head, &payload).unwrap();

        let (decoded, body) = decode_message(&framed).unwrap();
        prop_assert_eq!(decoded.size as usize, payload.len());
        prop_assert_eq!(decoded.family, family);
        prop_assert_eq!(decoded.port, port);
        prop_assert_eq!(decoded.address, address);
        prop_assert_eq!(body, &payload[..]);
    }

    #[test]
    fn prop_head_then_payload_matches_encode_message(
        port in any::<u16>(),
        payload in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let head = MessageHead::new(payload.len() as u16, AddressFamily::IPv6, port, "fe80::1");
        let mut concatenated = encode_head(&head).to_vec();
        concatenated.extend_from_slice(&payload);

        prop_assert_eq!(&encode_message(&head, &payload).unwrap()[..], &concatenated[..]);
    }

    #[test]
    fn prop_arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..64)) {
        let _ = decode_message(&data);
    }
}

#[test]
fn test_max_payload_round_trip() {
    let payload = vec![0x5A; u16::MAX as usize];
    let head = MessageHead::new(0, AddressFamily::IPv4, 65535, "255.255.255.255");
    let framed = encode_message(&head, &payload).unwrap();
    assert_eq!(framed.len(), FIXED_HEADER_LEN + 15 + payload.len());

    let datagram = decode_bytes(framed).unwrap();
    assert_eq!(datagram.size(), u16::MAX);
    assert_eq!(datagram.port(), 65535);
    assert_eq!(datagram.address(), "255.255.255.255");
    assert_eq!(&datagram.body[..], &payload[..]);
}

#[test]
fn test_hand_built_buffer_decodes() {
    // A peer writing the layout by hand: size=2, IPv6, port 8080, "::1", body
    let mut wire = vec![0x00, 0x02, 0x06, 0x1F, 0x90];
    wire.extend_from_slice(b"::1");
    wire.extend_from_slice(&[0xCA, 0xFE]);

    let datagram = decode_bytes(Bytes::from(wire)).unwrap();
    assert_eq!(
        datagram.head,
        MessageHead::new(2, AddressFamily::IPv6, 8080, "::1")
    );
    assert_eq!(&datagram.body[..], &[0xCA, 0xFE]);
}

#[test]
fn test_body_is_the_trailing_size_bytes() {
    // Payload that itself looks like an address must not confuse the split
    let head = MessageHead::new(0, AddressFamily::IPv4, 1, "10.0.0.1");
    let framed = encode_message(&head, b"10.0.0.2").unwrap();

    let (decoded, body) = decode_message(&framed).unwrap();
    assert_eq!(decoded.address, "10.0.0.1");
    assert_eq!(body, b"10.0.0.2");
}

#[test]
fn test_truncated_datagram_is_rejected() {
    let framed = encode_message(
        &MessageHead::new(0, AddressFamily::IPv4, 1, "127.0.0.1"),
        &[0u8; 300],
    )
    .unwrap();

    // Cutting off the payload and the address makes the declared size impossible
    let truncated = &framed[..100];
    assert!(matches!(
        decode_message(truncated),
        Err(ProtocolError::SizeExceedsBuffer { declared: 300, .. })
    ));
}

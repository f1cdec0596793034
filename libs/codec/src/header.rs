//! # Inline Header Codec
//!
//! ## Purpose
//!
//! Lets per-datagram origin metadata travel inline with the payload when both
//! have to share one opaque byte buffer. The header is a fixed 5-byte prefix
//! followed by the textual source address; the payload fills the rest.
//!
//! ## Wire Layout (big-endian)
//!
//! ```text
//! 0       2      3       5                    total-size          total
//! ┌───────┬──────┬───────┬────────────────────┬────────────────────┐
//! │ size  │ fam  │ port  │ address (UTF-8)    │ payload (size B)   │
//! │ u16   │ u8   │ u16   │ length implied     │                    │
//! └───────┴──────┴───────┴────────────────────┴────────────────────┘
//! ```
//!
//! The address length is never stored. Decoding derives it as
//! `total - size - 5`, which only works because `size` is always carried
//! first and the payload always occupies the final `size` bytes. Byte order
//! and that derivation are the interoperability contract.
//!
//! `fam` is `0x04` (IPv4) or `0x06` (IPv6). Any other tag is rejected with
//! [`ProtocolError::UnknownFamily`]. Older peers read every tag other than
//! `0x06` as IPv4, so a buffer they accept can fail to decode here.

use crate::error::{ProtocolError, ProtocolResult};
use crate::head::{AddressFamily, Datagram, MessageHead};
use bytes::{BufMut, Bytes, BytesMut};
use std::convert::TryFrom;

/// Length of the fixed header part (size + family + port)
pub const FIXED_HEADER_LEN: usize = 5;

/// Largest payload the 16-bit size field can describe
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

const SIZE_OFFSET: usize = 0;
const FAMILY_OFFSET: usize = 2;
const PORT_OFFSET: usize = 3;
const ADDRESS_OFFSET: usize = 5;

/// Number of bytes `encode_head` produces for this head
pub fn encoded_len(head: &MessageHead) -> usize {
    FIXED_HEADER_LEN + head.address.len()
}

/// Append the encoded head to `dst`
pub fn encode_head_into(head: &MessageHead, dst: &mut BytesMut) {
    dst.reserve(encoded_len(head));
    dst.put_u16(head.size);
    dst.put_u8(head.family.tag());
    dst.put_u16(head.port);
    dst.put_slice(head.address.as_bytes());
}

/// Encode a head on its own, without payload
pub fn encode_head(head: &MessageHead) -> Bytes {
    let mut buffer = BytesMut::with_capacity(encoded_len(head));
    encode_head_into(head, &mut buffer);
    buffer.freeze()
}

/// Build `encode(head) ‖ payload` as one buffer
///
/// The size written is always the payload length; `head.size` is ignored so
/// the derived address length can never disagree with the buffer.
pub fn encode_message(head: &MessageHead, payload: &[u8]) -> ProtocolResult<Bytes> {
    let size = u16::try_from(payload.len())
        .map_err(|_| ProtocolError::payload_too_large(payload.len(), MAX_PAYLOAD_LEN))?;

    let mut buffer = BytesMut::with_capacity(encoded_len(head) + payload.len());
    buffer.put_u16(size);
    buffer.put_u8(head.family.tag());
    buffer.put_u16(head.port);
    buffer.put_slice(head.address.as_bytes());
    buffer.put_slice(payload);

    Ok(buffer.freeze())
}

/// Parse the head of a headered message and locate its body
///
/// Returns the head and the byte range of the body inside `data`.
fn parse(data: &[u8]) -> ProtocolResult<(MessageHead, usize)> {
    let total = data.len();
    if total < FIXED_HEADER_LEN {
        return Err(ProtocolError::message_too_small(
            FIXED_HEADER_LEN,
            total,
            "inline header parsing",
        ));
    }

    let size = u16::from_be_bytes([data[SIZE_OFFSET], data[SIZE_OFFSET + 1]]);
    let tag = data[FAMILY_OFFSET];
    let port = u16::from_be_bytes([data[PORT_OFFSET], data[PORT_OFFSET + 1]]);

    let family = AddressFamily::try_from(tag).map_err(|_| ProtocolError::UnknownFamily { tag })?;

    let available = total - FIXED_HEADER_LEN;
    if usize::from(size) > available {
        return Err(ProtocolError::size_exceeds_buffer(
            usize::from(size),
            available,
            total,
        ));
    }

    let body_start = total - usize::from(size);
    let address = std::str::from_utf8(&data[ADDRESS_OFFSET..body_start])
        .map_err(|e| ProtocolError::invalid_address(ADDRESS_OFFSET, body_start, e.to_string()))?;

    Ok((MessageHead::new(size, family, port, address), body_start))
}

/// Decode a headered message, borrowing the body from `data`
pub fn decode_message(data: &[u8]) -> ProtocolResult<(MessageHead, &[u8])> {
    let (head, body_start) = parse(data)?;
    Ok((head, &data[body_start..]))
}

/// Decode a headered message without copying the body
pub fn decode_bytes(data: Bytes) -> ProtocolResult<Datagram> {
    let (head, body_start) = parse(&data)?;
    let body = data.slice(body_start..);
    Ok(Datagram::new(head, body))
}

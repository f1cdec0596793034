//! # Datagram Header Codec
//!
//! ## Purpose
//!
//! The "rules" layer for multiplexing datagram origin metadata and payload
//! onto a single byte-oriented stream:
//! - [`MessageHead`] / [`AddressFamily`] value types
//! - [`Datagram`] structured records
//! - Bit-exact encoding and decoding of the inline header
//!
//! ## Architecture Role
//!
//! ```text
//! dgram-codec → dgram-stream (ingress framing)
//!      ↑              ↓
//! Wire Rules     Sockets, flow control
//! MessageHead    IngressAdapter / EgressAdapter
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Socket management or lifecycle handling (belongs in dgram-stream)
//! - Endpoint configuration (belongs in dgram-config)
//!
//! ## Example
//!
//! ```
//! use dgram_codec::{decode_message, encode_message, AddressFamily, MessageHead};
//!
//! let head = MessageHead::new(0, AddressFamily::IPv4, 45007, "127.0.0.1");
//! let framed = encode_message(&head, b"payload").unwrap();
//!
//! let (decoded, body) = decode_message(&framed).unwrap();
//! assert_eq!(decoded.size, 7);
//! assert_eq!(decoded.address, "127.0.0.1");
//! assert_eq!(body, b"payload");
//! ```

pub mod error;
pub mod head;
pub mod header;

pub use error::{ProtocolError, ProtocolResult};
pub use head::{AddressFamily, Datagram, MessageHead};
pub use header::{
    decode_bytes, decode_message, encode_head, encode_head_into, encode_message, encoded_len,
    FIXED_HEADER_LEN, MAX_PAYLOAD_LEN,
};

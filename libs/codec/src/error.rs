//! Protocol-level errors for inline header processing
//!
//! Every variant carries enough buffer context to tell a truncated datagram
//! apart from a corrupted header or a peer speaking a different format.
//! Decode errors are local to a single call; they never describe the state of
//! a socket.

use thiserror::Error;

/// Header encoding/decoding errors with diagnostic context
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is too small to hold the fixed part of the header
    #[error("Message too small: need {need} bytes, got {got} (context: {context})")]
    MessageTooSmall {
        need: usize,
        got: usize,
        context: String,
    },

    /// Declared payload size runs past the end of the buffer
    #[error("Declared size {declared} exceeds the {available} bytes following the fixed header (buffer: {buffer_size} bytes, indicates: {diagnosis})")]
    SizeExceedsBuffer {
        declared: usize,
        available: usize,
        buffer_size: usize,
        diagnosis: String,
    },

    /// Family tag is neither 0x04 nor 0x06
    #[error("Unknown address family tag {tag:#04x}: expected 0x04 (IPv4) or 0x06 (IPv6)")]
    UnknownFamily { tag: u8 },

    /// Address bytes are not valid UTF-8
    #[error("Invalid address at bytes {start}..{end}: {reason}")]
    InvalidAddress {
        start: usize,
        end: usize,
        reason: String,
    },

    /// Payload cannot be described by the 16-bit size field
    #[error("Payload too large: {size} bytes exceeds limit {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
}

impl ProtocolError {
    /// Create MessageTooSmall error with context
    pub fn message_too_small(need: usize, got: usize, context: impl Into<String>) -> Self {
        Self::MessageTooSmall {
            need,
            got,
            context: context.into(),
        }
    }

    /// Create SizeExceedsBuffer error with a best guess at the cause
    pub fn size_exceeds_buffer(declared: usize, available: usize, buffer_size: usize) -> Self {
        let diagnosis = if available == 0 {
            "header without payload or address"
        } else if declared > available.saturating_mul(2) {
            "likely not a headered message or wrong byte order"
        } else {
            "truncated datagram"
        };

        Self::SizeExceedsBuffer {
            declared,
            available,
            buffer_size,
            diagnosis: diagnosis.to_string(),
        }
    }

    /// Create InvalidAddress error
    pub fn invalid_address(start: usize, end: usize, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            start,
            end,
            reason: reason.into(),
        }
    }

    /// Create PayloadTooLarge error
    pub fn payload_too_large(size: usize, limit: usize) -> Self {
        Self::PayloadTooLarge { size, limit }
    }
}

/// Result type for header operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

//! Ingress framing modes
//!
//! Decides what the consumer receives for each datagram:
//!
//! | mode       | emitted                                   |
//! |------------|-------------------------------------------|
//! | headless   | the payload unchanged                     |
//! | headered   | `encode(head) ‖ payload` as one buffer    |
//! | structured | a [`Datagram`] record (head + payload)    |

use bytes::Bytes;
use dgram_codec::{
    decode_bytes, encode_message, Datagram, MessageHead, ProtocolError, ProtocolResult,
    MAX_PAYLOAD_LEN,
};
use dgram_config::IngressConfig;
use std::net::SocketAddr;

/// Framing selected at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Framing {
    Headless,
    Headered,
    Structured,
}

impl Framing {
    /// `headless` wins over `structured`
    pub fn from_flags(headless: bool, structured: bool) -> Self {
        match (headless, structured) {
            (true, _) => Framing::Headless,
            (false, false) => Framing::Headered,
            (false, true) => Framing::Structured,
        }
    }

    pub fn from_config(config: &IngressConfig) -> Self {
        Self::from_flags(config.headless, config.structured)
    }

    /// Frame one datagram received from `source`
    ///
    /// Fails only when the payload does not fit the 16-bit size field.
    pub fn frame(self, payload: Bytes, source: SocketAddr) -> ProtocolResult<IngressMessage> {
        match self {
            Framing::Headless => Ok(IngressMessage::Payload(payload)),
            Framing::Headered => {
                let head = MessageHead::from_source(0, source);
                encode_message(&head, &payload).map(IngressMessage::Framed)
            }
            Framing::Structured => {
                let size = u16::try_from(payload.len()).map_err(|_| {
                    ProtocolError::payload_too_large(payload.len(), MAX_PAYLOAD_LEN)
                })?;
                let head = MessageHead::from_source(size, source);
                Ok(IngressMessage::Record(Datagram::new(head, payload)))
            }
        }
    }
}

/// One unit delivered to the ingress consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressMessage {
    /// Raw payload (headless)
    Payload(Bytes),
    /// Header and payload in one buffer (headered)
    Framed(Bytes),
    /// Metadata record (structured)
    Record(Datagram),
}

impl IngressMessage {
    /// Bytes as emitted, for the flat modes
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            IngressMessage::Payload(bytes) | IngressMessage::Framed(bytes) => Some(bytes),
            IngressMessage::Record(_) => None,
        }
    }

    /// Application payload regardless of mode
    ///
    /// Decodes the header of a framed buffer; the body is not copied.
    pub fn payload(&self) -> ProtocolResult<Bytes> {
        match self {
            IngressMessage::Payload(bytes) => Ok(bytes.clone()),
            IngressMessage::Framed(bytes) => decode_bytes(bytes.clone()).map(|d| d.body),
            IngressMessage::Record(record) => Ok(record.body.clone()),
        }
    }

    /// Origin metadata, when the mode carries any
    pub fn into_datagram(self) -> Option<ProtocolResult<Datagram>> {
        match self {
            IngressMessage::Payload(_) => None,
            IngressMessage::Framed(bytes) => Some(decode_bytes(bytes)),
            IngressMessage::Record(record) => Some(Ok(record)),
        }
    }

    /// Length of what was emitted
    pub fn len(&self) -> usize {
        match self {
            IngressMessage::Payload(bytes) | IngressMessage::Framed(bytes) => bytes.len(),
            IngressMessage::Record(record) => record.body.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgram_codec::AddressFamily;

    fn source() -> SocketAddr {
        "127.0.0.1:45007".parse().unwrap()
    }

    #[test]
    fn test_flag_precedence() {
        assert_eq!(Framing::from_flags(true, true), Framing::Headless);
        assert_eq!(Framing::from_flags(true, false), Framing::Headless);
        assert_eq!(Framing::from_flags(false, false), Framing::Headered);
        assert_eq!(Framing::from_flags(false, true), Framing::Structured);
        assert_eq!(
            Framing::from_config(&IngressConfig::default()),
            Framing::Headless
        );
    }

    #[test]
    fn test_headless_passes_payload_through() {
        let payload = Bytes::from_static(b"abc");
        let message = Framing::Headless.frame(payload.clone(), source()).unwrap();
        assert_eq!(message, IngressMessage::Payload(payload));
        assert!(message.clone().into_datagram().is_none());
    }

    #[test]
    fn test_headered_layout() {
        let message = Framing::Headered
            .frame(Bytes::from_static(b"abc"), source())
            .unwrap();

        let mut expected = vec![0x00, 0x03, 0x04, 0xAF, 0xCF];
        expected.extend_from_slice(b"127.0.0.1");
        expected.extend_from_slice(b"abc");
        assert_eq!(message.as_bytes().unwrap().as_ref(), &expected[..]);
        assert_eq!(message.payload().unwrap(), Bytes::from_static(b"abc"));
    }

    #[test]
    fn test_structured_record() {
        let v6: SocketAddr = "[::1]:9000".parse().unwrap();
        let message = Framing::Structured
            .frame(Bytes::from_static(b"hello"), v6)
            .unwrap();

        let record = message.into_datagram().unwrap().unwrap();
        assert_eq!(record.size(), 5);
        assert_eq!(record.family(), AddressFamily::IPv6);
        assert_eq!(record.port(), 9000);
        assert_eq!(record.address(), "::1");
        assert_eq!(record.body, Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_oversized_payload_rejected_when_framed() {
        let payload = Bytes::from(vec![0u8; 70_000]);
        assert!(Framing::Headered.frame(payload.clone(), source()).is_err());
        assert!(Framing::Structured.frame(payload.clone(), source()).is_err());
        assert!(Framing::Headless.frame(payload, source()).is_ok());
    }
}

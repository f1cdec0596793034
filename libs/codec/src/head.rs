//! Per-datagram provenance values
//!
//! A [`MessageHead`] describes where one datagram came from. It is produced
//! fresh for every received datagram and never mutated afterwards; structured
//! consumers get a [`Datagram`], a new record pairing the head with its body.

use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Address family of a datagram's origin, tagged on the wire as 0x04 / 0x06
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum AddressFamily {
    #[serde(rename = "IPv4")]
    IPv4 = 0x04,
    #[serde(rename = "IPv6")]
    IPv6 = 0x06,
}

impl AddressFamily {
    /// Family of an IP address
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self::IPv4,
            IpAddr::V6(_) => Self::IPv6,
        }
    }

    /// Wire tag for this family
    pub fn tag(self) -> u8 {
        self.into()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::IPv4 => "IPv4",
            Self::IPv6 => "IPv6",
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin metadata of one datagram
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHead {
    /// Payload length in bytes
    pub size: u16,
    /// Family of the origin address
    pub family: AddressFamily,
    /// Origin port
    pub port: u16,
    /// Origin IP in textual form
    pub address: String,
}

impl MessageHead {
    pub fn new(size: u16, family: AddressFamily, port: u16, address: impl Into<String>) -> Self {
        Self {
            size,
            family,
            port,
            address: address.into(),
        }
    }

    /// Describe a datagram of `size` bytes received from `source`
    pub fn from_source(size: u16, source: SocketAddr) -> Self {
        let ip = source.ip();
        Self {
            size,
            family: AddressFamily::of(&ip),
            port: source.port(),
            address: ip.to_string(),
        }
    }

    /// Parse the textual address back into an IP, if it is a literal
    pub fn ip(&self) -> Option<IpAddr> {
        self.address.parse().ok()
    }

    /// Origin as a socket address, if the address is an IP literal
    pub fn source(&self) -> Option<SocketAddr> {
        self.ip().map(|ip| SocketAddr::new(ip, self.port))
    }
}

/// Structured record: a head plus the payload it describes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub head: MessageHead,
    pub body: Bytes,
}

impl Datagram {
    pub fn new(head: MessageHead, body: Bytes) -> Self {
        Self { head, body }
    }

    pub fn size(&self) -> u16 {
        self.head.size
    }

    pub fn family(&self) -> AddressFamily {
        self.head.family
    }

    pub fn port(&self) -> u16 {
        self.head.port
    }

    pub fn address(&self) -> &str {
        &self.head.address
    }

    pub fn into_parts(self) -> (MessageHead, Bytes) {
        (self.head, self.body)
    }
}

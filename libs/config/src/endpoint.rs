//! Endpoint Configuration Module
//!
//! Construction-time settings for the ingress (bound) and egress (connected)
//! adapters. Both are immutable once an adapter is built from them.

use crate::defaults::{
    DEFAULT_ADDRESS_V4, DEFAULT_ADDRESS_V6, DEFAULT_HIGH_WATER_MARK, DEFAULT_PORT,
    DEFAULT_RECV_BUFFER_SIZE, MAX_DATAGRAM_SIZE,
};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;
use tracing::warn;

/// A setting outside its allowed range
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct InvalidSetting {
    pub field: &'static str,
    pub message: String,
}

impl InvalidSetting {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Transport family of the socket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SocketFamily {
    #[default]
    #[serde(rename = "udp4", alias = "v4", alias = "ipv4")]
    Udp4,
    #[serde(rename = "udp6", alias = "v6", alias = "ipv6")]
    Udp6,
}

impl SocketFamily {
    /// Loopback address used when no address is configured
    pub fn default_address(self) -> &'static str {
        match self {
            Self::Udp4 => DEFAULT_ADDRESS_V4,
            Self::Udp6 => DEFAULT_ADDRESS_V6,
        }
    }

    /// Whether an IP belongs to this family
    pub fn matches(self, ip: &IpAddr) -> bool {
        matches!(
            (self, ip),
            (Self::Udp4, IpAddr::V4(_)) | (Self::Udp6, IpAddr::V6(_))
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Udp4 => "udp4",
            Self::Udp6 => "udp6",
        }
    }
}

impl fmt::Display for SocketFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ingress adapter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    /// Transport family
    pub family: SocketFamily,
    /// Bind address; the family's loopback when unset
    pub address: Option<String>,
    /// Bind port; 0 requests an OS-assigned port
    pub port: u16,
    /// Emit raw payloads without origin metadata
    pub headless: bool,
    /// Emit metadata records instead of flat buffers (only when not headless)
    pub structured: bool,
    /// Messages buffered for the consumer before backpressure is signalled
    pub high_water_mark: usize,
    /// Receive buffer size per datagram
    pub recv_buffer_size: usize,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            family: SocketFamily::Udp4,
            address: None,
            port: DEFAULT_PORT,
            headless: true,
            structured: false,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }
}

impl IngressConfig {
    /// Configuration for an IPv6 endpoint, everything else default
    pub fn v6() -> Self {
        Self {
            family: SocketFamily::Udp6,
            ..Self::default()
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_structured(mut self, structured: bool) -> Self {
        self.structured = structured;
        self
    }

    pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.high_water_mark = high_water_mark;
        self
    }

    /// Bind address, falling back to the family's loopback
    pub fn bind_address(&self) -> &str {
        self.address
            .as_deref()
            .unwrap_or_else(|| self.family.default_address())
    }

    /// Check the whole configuration, address included
    pub fn validate(&self) -> Result<()> {
        validate_address(self.family, self.bind_address())?;
        self.validate_settings()?;
        Ok(())
    }

    /// Check everything except the address
    ///
    /// The address is only checked against the family when the endpoint is
    /// bound, where a mismatch is a bind failure.
    pub fn validate_settings(&self) -> std::result::Result<(), InvalidSetting> {
        if self.high_water_mark == 0 {
            return Err(InvalidSetting::new(
                "high_water_mark",
                "must be at least 1",
            ));
        }

        if self.recv_buffer_size == 0 || self.recv_buffer_size > usize::from(u16::MAX) {
            return Err(InvalidSetting::new(
                "recv_buffer_size",
                format!(
                    "must be between 1 and {}, got {}",
                    u16::MAX,
                    self.recv_buffer_size
                ),
            ));
        }

        if self.recv_buffer_size < MAX_DATAGRAM_SIZE {
            warn!(
                "recv_buffer_size {} is below the largest UDP payload ({}); long datagrams will be truncated",
                self.recv_buffer_size, MAX_DATAGRAM_SIZE
            );
        }

        if self.headless && self.structured {
            warn!("structured has no effect while headless is enabled");
        }

        Ok(())
    }
}

/// Egress adapter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EgressConfig {
    /// Transport family
    pub family: SocketFamily,
    /// Remote host; the family's loopback when unset
    #[serde(alias = "address")]
    pub host: Option<String>,
    /// Remote port
    pub port: u16,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            family: SocketFamily::Udp4,
            host: None,
            port: DEFAULT_PORT,
        }
    }
}

impl EgressConfig {
    /// Configuration for an IPv6 endpoint, everything else default
    pub fn v6() -> Self {
        Self {
            family: SocketFamily::Udp6,
            ..Self::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Remote host, falling back to the family's loopback
    pub fn remote_host(&self) -> &str {
        self.host
            .as_deref()
            .unwrap_or_else(|| self.family.default_address())
    }

    pub fn validate(&self) -> Result<()> {
        validate_address(self.family, self.remote_host())?;
        self.validate_settings()?;
        Ok(())
    }

    /// Check everything except the remote host
    pub fn validate_settings(&self) -> std::result::Result<(), InvalidSetting> {
        if self.port == 0 {
            return Err(InvalidSetting::new("port", "egress port must be non-zero"));
        }

        Ok(())
    }
}

/// IP literals must match the family; host names are resolved later
fn validate_address(family: SocketFamily, address: &str) -> Result<()> {
    if address.is_empty() {
        bail!("address must not be empty");
    }

    if let Ok(ip) = address.parse::<IpAddr>() {
        if !family.matches(&ip) {
            bail!("address {} does not belong to family {}", ip, family);
        }
    }

    Ok(())
}

//! Datagram Transport Providers
//!
//! The adapters never touch an OS socket directly. They acquire endpoints
//! through a [`NetworkProvider`] and talk to them through [`DatagramSocket`],
//! so the same lifecycle and flow-control code runs against:
//!
//! - [`TokioNetworkProvider`]: real UDP sockets
//! - [`MemoryNetwork`]: an in-process datagram fabric with bounded inboxes
//!   and fault injection, for deterministic tests
//!
//! Dropping a socket releases the endpoint.

pub mod memory;
pub mod udp;

pub use memory::{MemoryNetwork, MemorySocket, DEFAULT_INBOX_CAPACITY};
pub use udp::{TokioNetworkProvider, UdpDatagramSocket};

use async_trait::async_trait;
use bytes::Bytes;
use dgram_config::SocketFamily;
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::task::{Context, Poll};

/// Source of datagram endpoints
#[async_trait]
pub trait NetworkProvider: Clone + Send + Sync + 'static {
    type Socket: DatagramSocket;

    /// Acquire a local endpoint at `addr`; port 0 picks a free port
    async fn bind(&self, addr: SocketAddr) -> io::Result<Self::Socket>;

    /// Acquire an endpoint whose sends go to `remote`
    async fn connect(&self, remote: SocketAddr) -> io::Result<Self::Socket>;

    /// Turn a host into an address of `family`
    ///
    /// An address of another family is `InvalidInput`.
    async fn resolve(
        &self,
        host: &str,
        port: u16,
        family: SocketFamily,
    ) -> io::Result<SocketAddr> {
        resolve_address(host, port, family).await
    }
}

/// One acquired datagram endpoint
#[async_trait]
pub trait DatagramSocket: Send + Sync + 'static {
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Remote endpoint of a connected socket
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Next datagram and its source; cancel-safe
    async fn recv_from(&mut self) -> io::Result<(Bytes, SocketAddr)>;

    /// Ready when a send would not block
    fn poll_send_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>>;

    /// Send one datagram to the connected peer without waiting
    ///
    /// Fails with `WouldBlock` when the send buffer is full.
    fn try_send(&self, payload: &[u8]) -> io::Result<usize>;

    /// Largest datagram `recv_from` returns; longer ones are truncated
    fn set_recv_buffer_size(&mut self, _size: usize) {}
}

impl fmt::Debug for dyn DatagramSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatagramSocket")
            .field("local", &self.local_addr().ok())
            .field("peer", &self.peer_addr().ok())
            .finish()
    }
}

/// Resolve `host` through the system resolver, keeping only `family`
///
/// IP literals (bracketed IPv6 included) never hit the resolver.
pub async fn resolve_address(
    host: &str,
    port: u16,
    family: SocketFamily,
) -> io::Result<SocketAddr> {
    let literal = host.trim_start_matches('[').trim_end_matches(']');

    if let Ok(ip) = literal.parse::<IpAddr>() {
        if !family.matches(&ip) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a {} address", ip, family),
            ));
        }
        return Ok(SocketAddr::new(ip, port));
    }

    let mut candidates = tokio::net::lookup_host((host, port)).await?;

    candidates.find(|addr| family.matches(&addr.ip())).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no {} address", host, family),
        )
    })
}

/// `host:port` for error messages, bracketing bare IPv6 literals
pub(crate) fn endpoint_label(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Unspecified address of the same family, for connect-side binds
pub(crate) fn unspecified_for(remote: &SocketAddr) -> SocketAddr {
    match remote {
        SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
        SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
    }
}

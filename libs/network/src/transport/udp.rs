//! UDP Network Transport Implementation
//!
//! Real datagram endpoints backed by `tokio::net::UdpSocket`. Received
//! datagrams are read into a reusable `BytesMut` sized to the receive buffer
//! and copied out as exactly-sized `Bytes`, so a payload held in the ingress
//! queue never pins the whole buffer. Datagrams longer than the buffer are
//! truncated.

use super::{unspecified_for, DatagramSocket, NetworkProvider};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dgram_config::DEFAULT_RECV_BUFFER_SIZE;
use std::io;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Provider handing out real UDP sockets
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioNetworkProvider;

impl TokioNetworkProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NetworkProvider for TokioNetworkProvider {
    type Socket = UdpDatagramSocket;

    async fn bind(&self, addr: SocketAddr) -> io::Result<Self::Socket> {
        let socket = UdpSocket::bind(addr).await?;
        info!("UDP socket bound to: {}", socket.local_addr()?);
        Ok(UdpDatagramSocket::new(socket))
    }

    async fn connect(&self, remote: SocketAddr) -> io::Result<Self::Socket> {
        let socket = UdpSocket::bind(unspecified_for(&remote)).await?;
        socket.connect(remote).await?;
        info!("UDP socket connected to: {}", remote);
        Ok(UdpDatagramSocket::new(socket))
    }
}

/// One OS datagram socket
#[derive(Debug)]
pub struct UdpDatagramSocket {
    inner: UdpSocket,
    recv_buffer: BytesMut,
    recv_buffer_size: usize,
}

impl UdpDatagramSocket {
    pub fn new(inner: UdpSocket) -> Self {
        Self {
            inner,
            recv_buffer: BytesMut::with_capacity(DEFAULT_RECV_BUFFER_SIZE),
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }

    pub fn get_ref(&self) -> &UdpSocket {
        &self.inner
    }
}

#[async_trait]
impl DatagramSocket for UdpDatagramSocket {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    async fn recv_from(&mut self) -> io::Result<(Bytes, SocketAddr)> {
        if self.recv_buffer.len() != self.recv_buffer_size {
            self.recv_buffer.resize(self.recv_buffer_size, 0);
        }

        let (len, source) = self.inner.recv_from(&mut self.recv_buffer[..]).await?;
        debug!("Received UDP datagram: {} bytes from {}", len, source);

        Ok((Bytes::copy_from_slice(&self.recv_buffer[..len]), source))
    }

    fn poll_send_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.poll_send_ready(cx)
    }

    fn try_send(&self, payload: &[u8]) -> io::Result<usize> {
        self.inner.try_send(payload)
    }

    fn set_recv_buffer_size(&mut self, size: usize) {
        self.recv_buffer_size = size;
    }
}

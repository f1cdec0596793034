//! In-process datagram network
//!
//! Every endpoint owns a bounded inbox. A send into a full inbox fails with
//! `WouldBlock` and [`DatagramSocket::poll_send_ready`] parks the sender
//! until the receiver drains an entry, which makes backpressure observable
//! without relying on OS buffer sizes. Datagrams to unbound addresses are
//! dropped, as they would be on a real network.
//!
//! [`MemoryNetwork::inject_fault`] makes the next receive on an endpoint
//! fail and [`MemoryNetwork::inject_send_fault`] does the same for its next
//! send, for exercising the failure paths of the adapters.

use super::{DatagramSocket, NetworkProvider};
use async_trait::async_trait;
use bytes::Bytes;
use dgram_config::MAX_DATAGRAM_SIZE;
use futures::future::poll_fn;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use tracing::{debug, trace};

/// Datagrams an endpoint holds before senders see `WouldBlock`
pub const DEFAULT_INBOX_CAPACITY: usize = 1024;

const EPHEMERAL_PORT_START: u16 = 49152;

#[derive(Debug)]
struct Inbox {
    queue: VecDeque<(Bytes, SocketAddr)>,
    capacity: usize,
    recv_waker: Option<Waker>,
    send_wakers: Vec<Waker>,
    recv_fault: Option<io::ErrorKind>,
    send_fault: Option<io::ErrorKind>,
}

impl Inbox {
    fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity,
            recv_waker: None,
            send_wakers: Vec::new(),
            recv_fault: None,
            send_fault: None,
        }
    }

    fn is_full(&self) -> bool {
        self.queue.len() >= self.capacity
    }

    fn wake_receiver(&mut self) {
        if let Some(waker) = self.recv_waker.take() {
            waker.wake();
        }
    }

    fn wake_senders(&mut self) {
        for waker in self.send_wakers.drain(..) {
            waker.wake();
        }
    }
}

#[derive(Debug)]
struct Fabric {
    endpoints: HashMap<SocketAddr, Arc<Mutex<Inbox>>>,
    next_port: u16,
    inbox_capacity: usize,
}

impl Fabric {
    fn port_taken(&self, ip: &IpAddr, port: u16) -> bool {
        self.endpoints
            .keys()
            .any(|addr| addr.port() == port && addr.is_ipv4() == ip.is_ipv4())
    }

    fn allocate_port(&mut self, ip: &IpAddr) -> io::Result<u16> {
        let span = u32::from(u16::MAX - EPHEMERAL_PORT_START) + 1;
        for _ in 0..span {
            let port = self.next_port;
            self.next_port = if port == u16::MAX {
                EPHEMERAL_PORT_START
            } else {
                port + 1
            };
            if !self.port_taken(ip, port) {
                return Ok(port);
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no free ephemeral port",
        ))
    }

    /// Exact match first, then a wildcard bind on the same port
    fn lookup(&self, dest: &SocketAddr) -> Option<Arc<Mutex<Inbox>>> {
        self.endpoints.get(dest).cloned().or_else(|| {
            let wildcard = SocketAddr::new(unspecified_ip(&dest.ip()), dest.port());
            self.endpoints.get(&wildcard).cloned()
        })
    }
}

fn unspecified_ip(ip: &IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

fn loopback_ip(ip: &IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
    }
}

/// Shared in-process network; clones see the same endpoints
#[derive(Debug, Clone)]
pub struct MemoryNetwork {
    fabric: Arc<Mutex<Fabric>>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::with_inbox_capacity(DEFAULT_INBOX_CAPACITY)
    }

    /// Network whose endpoints hold at most `capacity` datagrams
    pub fn with_inbox_capacity(capacity: usize) -> Self {
        Self {
            fabric: Arc::new(Mutex::new(Fabric {
                endpoints: HashMap::new(),
                next_port: EPHEMERAL_PORT_START,
                inbox_capacity: capacity.max(1),
            })),
        }
    }

    /// Whether an endpoint is currently bound at `addr`
    pub fn is_bound(&self, addr: SocketAddr) -> bool {
        self.fabric.lock().endpoints.contains_key(&addr)
    }

    /// Number of live endpoints
    pub fn endpoint_count(&self) -> usize {
        self.fabric.lock().endpoints.len()
    }

    /// Datagrams waiting in the inbox at `addr`
    pub fn queued(&self, addr: SocketAddr) -> Option<usize> {
        let inbox = self.fabric.lock().endpoints.get(&addr).cloned()?;
        let len = inbox.lock().queue.len();
        Some(len)
    }

    /// Make the next receive at `addr` fail with `kind`
    ///
    /// Returns false when nothing is bound there.
    pub fn inject_fault(&self, addr: SocketAddr, kind: io::ErrorKind) -> bool {
        let Some(inbox) = self.fabric.lock().endpoints.get(&addr).cloned() else {
            return false;
        };

        debug!("Injecting {:?} into memory endpoint {}", kind, addr);
        let mut inbox = inbox.lock();
        inbox.recv_fault = Some(kind);
        inbox.wake_receiver();
        true
    }

    /// Make the next send from the endpoint at `addr` fail with `kind`
    ///
    /// Returns false when nothing is bound there.
    pub fn inject_send_fault(&self, addr: SocketAddr, kind: io::ErrorKind) -> bool {
        let Some(inbox) = self.fabric.lock().endpoints.get(&addr).cloned() else {
            return false;
        };

        debug!("Injecting send {:?} into memory endpoint {}", kind, addr);
        inbox.lock().send_fault = Some(kind);
        true
    }

    fn register(&self, addr: SocketAddr) -> io::Result<MemorySocket> {
        let mut fabric = self.fabric.lock();
        let ip = addr.ip();

        let port = if addr.port() == 0 {
            fabric.allocate_port(&ip)?
        } else if fabric.port_taken(&ip, addr.port()) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("address {} already in use", addr),
            ));
        } else {
            addr.port()
        };

        let local = SocketAddr::new(ip, port);
        let inbox = Arc::new(Mutex::new(Inbox::new(fabric.inbox_capacity)));
        fabric.endpoints.insert(local, inbox.clone());
        debug!("Memory endpoint bound to: {}", local);

        Ok(MemorySocket {
            fabric: self.fabric.clone(),
            local,
            peer: None,
            inbox,
            recv_limit: usize::from(u16::MAX),
        })
    }
}

#[async_trait]
impl NetworkProvider for MemoryNetwork {
    type Socket = MemorySocket;

    async fn bind(&self, addr: SocketAddr) -> io::Result<Self::Socket> {
        self.register(addr)
    }

    async fn connect(&self, remote: SocketAddr) -> io::Result<Self::Socket> {
        let mut socket = self.register(SocketAddr::new(loopback_ip(&remote.ip()), 0))?;
        socket.peer = Some(remote);
        Ok(socket)
    }
}

/// Endpoint on a [`MemoryNetwork`]; dropping it unbinds the address
#[derive(Debug)]
pub struct MemorySocket {
    fabric: Arc<Mutex<Fabric>>,
    local: SocketAddr,
    peer: Option<SocketAddr>,
    inbox: Arc<Mutex<Inbox>>,
    recv_limit: usize,
}

impl MemorySocket {
    /// Address stamped on outgoing datagrams
    fn source(&self) -> SocketAddr {
        if self.local.ip().is_unspecified() {
            SocketAddr::new(loopback_ip(&self.local.ip()), self.local.port())
        } else {
            self.local
        }
    }

    fn connected_peer(&self) -> io::Result<SocketAddr> {
        self.peer
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket is not connected"))
    }

    /// Send one datagram to `dest` without waiting
    pub fn send_to(&self, payload: &[u8], dest: SocketAddr) -> io::Result<usize> {
        if let Some(kind) = self.inbox.lock().send_fault.take() {
            return Err(io::Error::new(kind, "injected fault"));
        }

        if payload.len() > MAX_DATAGRAM_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "datagram of {} bytes exceeds {}",
                    payload.len(),
                    MAX_DATAGRAM_SIZE
                ),
            ));
        }

        let Some(inbox) = self.fabric.lock().lookup(&dest) else {
            trace!("Dropping datagram to unbound address {}", dest);
            return Ok(payload.len());
        };

        let mut inbox = inbox.lock();
        if inbox.is_full() {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }

        inbox
            .queue
            .push_back((Bytes::copy_from_slice(payload), self.source()));
        inbox.wake_receiver();
        Ok(payload.len())
    }
}

#[async_trait]
impl DatagramSocket for MemorySocket {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.connected_peer()
    }

    async fn recv_from(&mut self) -> io::Result<(Bytes, SocketAddr)> {
        let limit = self.recv_limit;
        let inbox = self.inbox.clone();

        poll_fn(move |cx| {
            let mut inbox = inbox.lock();

            if let Some(kind) = inbox.recv_fault.take() {
                return Poll::Ready(Err(io::Error::new(kind, "injected fault")));
            }

            match inbox.queue.pop_front() {
                Some((mut payload, source)) => {
                    inbox.wake_senders();
                    payload.truncate(limit);
                    Poll::Ready(Ok((payload, source)))
                }
                None => {
                    inbox.recv_waker = Some(cx.waker().clone());
                    Poll::Pending
                }
            }
        })
        .await
    }

    fn poll_send_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let peer = self.connected_peer()?;
        let Some(inbox) = self.fabric.lock().lookup(&peer) else {
            return Poll::Ready(Ok(()));
        };

        let mut inbox = inbox.lock();
        if inbox.is_full() {
            inbox.send_wakers.push(cx.waker().clone());
            Poll::Pending
        } else {
            Poll::Ready(Ok(()))
        }
    }

    fn try_send(&self, payload: &[u8]) -> io::Result<usize> {
        let peer = self.connected_peer()?;
        self.send_to(payload, peer)
    }

    fn set_recv_buffer_size(&mut self, size: usize) {
        self.recv_limit = size;
    }
}

impl Drop for MemorySocket {
    fn drop(&mut self) {
        let mut fabric = self.fabric.lock();
        let ours = fabric
            .endpoints
            .get(&self.local)
            .is_some_and(|inbox| Arc::ptr_eq(inbox, &self.inbox));

        if ours {
            fabric.endpoints.remove(&self.local);
            debug!("Memory endpoint released: {}", self.local);
        }
    }
}

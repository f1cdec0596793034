//! Egress Adapter
//!
//! Connects a datagram endpoint to one remote peer and sends each written
//! chunk as exactly one datagram. Chunks are never coalesced or split.
//!
//! Writes never wait: a full send buffer is reported to the caller
//! ([`EgressAdapter::write`] returns `false`, [`EgressAdapter::send`] fails
//! with `SendBufferFull`) and [`EgressAdapter::writable`] resolves once a
//! retry can succeed. The [`Sink`] implementation builds the waiting loop on
//! top of that with a single parked chunk.

use crate::error::{Result, TransportError};
use crate::lifecycle::{
    AdapterEvent, CloseStep, Lifecycle, LifecycleState, Role, EVENT_CHANNEL_CAPACITY,
};
use crate::stats::EgressStats;
use crate::transport::{endpoint_label, DatagramSocket, NetworkProvider, TokioNetworkProvider};
use bytes::Bytes;
use dgram_config::{EgressConfig, SocketFamily};
use futures::future::{poll_fn, BoxFuture};
use futures::{ready, FutureExt, Sink};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Builder that allows observing `Ready` before the endpoint is connected
pub struct EgressBuilder<N = TokioNetworkProvider> {
    config: EgressConfig,
    provider: N,
    events: broadcast::Sender<AdapterEvent>,
}

impl EgressBuilder<TokioNetworkProvider> {
    pub fn new(config: EgressConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            provider: TokioNetworkProvider::new(),
            events,
        }
    }
}

impl<N: NetworkProvider> EgressBuilder<N> {
    /// Acquire the endpoint from another provider
    pub fn with_provider<M: NetworkProvider>(self, provider: M) -> EgressBuilder<M> {
        EgressBuilder {
            config: self.config,
            provider,
            events: self.events,
        }
    }

    /// Receive lifecycle notifications, including `Ready`
    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events.subscribe()
    }

    /// Resolve the remote host and connect
    ///
    /// Resolves once the endpoint is active. On failure subscribers see
    /// `Error` then `Close` and no `Ready`.
    pub async fn connect(self) -> Result<EgressAdapter> {
        let EgressBuilder {
            config,
            provider,
            events,
        } = self;

        config
            .validate_settings()
            .map_err(|e| TransportError::configuration(e.to_string(), Some(e.field)))?;

        let lifecycle = Lifecycle::with_events("egress", events);
        lifecycle.begin_acquire(Role::Connect)?;

        let (socket, local, peer) = match acquire(&provider, &config).await {
            Ok(acquired) => acquired,
            Err(error) => {
                lifecycle.fail(error.clone());
                lifecycle.released();
                return Err(error);
            }
        };

        lifecycle.acquired(local, Some(peer))?;
        info!(%local, %peer, "Egress adapter connected");

        let socket: Box<dyn DatagramSocket> = Box::new(socket);
        Ok(EgressAdapter {
            socket: RwLock::new(Some(socket)),
            lifecycle,
            config,
            local,
            peer,
            stats: Mutex::new(EgressStats::default()),
            parked: None,
            closing: Mutex::new(None),
        })
    }
}

async fn acquire<N: NetworkProvider>(
    provider: &N,
    config: &EgressConfig,
) -> Result<(N::Socket, SocketAddr, SocketAddr)> {
    let host = config.remote_host();
    let remote = provider
        .resolve(host, config.port, config.family)
        .await
        .map_err(|e| TransportError::connect(endpoint_label(host, config.port), e))?;

    let socket = provider
        .connect(remote)
        .await
        .map_err(|e| TransportError::connect(remote, e))?;

    let local = socket
        .local_addr()
        .map_err(|e| TransportError::connect(remote, e))?;
    let peer = socket
        .peer_addr()
        .map_err(|e| TransportError::connect(remote, e))?;

    Ok((socket, local, peer))
}

/// Connected datagram sink
pub struct EgressAdapter {
    socket: RwLock<Option<Box<dyn DatagramSocket>>>,
    lifecycle: Lifecycle,
    config: EgressConfig,
    local: SocketAddr,
    peer: SocketAddr,
    stats: Mutex<EgressStats>,
    /// Chunk accepted by the sink but refused by the send buffer
    parked: Option<Bytes>,
    /// Sink close waiting for a release started elsewhere; only reached
    /// through `&mut self`
    closing: Mutex<Option<BoxFuture<'static, ()>>>,
}

impl fmt::Debug for EgressAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EgressAdapter")
            .field("state", &self.lifecycle.state())
            .field("local", &self.local)
            .field("peer", &self.peer)
            .field("parked", &self.parked.as_ref().map(Bytes::len))
            .finish_non_exhaustive()
    }
}

impl EgressAdapter {
    /// Connect with the real UDP provider
    pub async fn connect(config: EgressConfig) -> Result<Self> {
        EgressBuilder::new(config).connect().await
    }

    /// Send one datagram now
    ///
    /// Fails with `SendBufferFull` when the send buffer refuses it; nothing
    /// is sent in that case and the adapter stays usable.
    pub fn send(&self, payload: &[u8]) -> Result<usize> {
        self.ensure_active()?;

        let outcome = {
            let socket = self.socket.read();
            let Some(socket) = socket.as_ref() else {
                return Err(TransportError::Closed);
            };
            socket.try_send(payload)
        };

        match outcome {
            Ok(sent) => {
                self.stats.lock().record_send(sent);
                trace!(bytes = sent, peer = %self.peer, "Datagram sent");
                Ok(sent)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.stats.lock().refused += 1;
                debug!(bytes = payload.len(), "Send buffer full");
                Err(TransportError::SendBufferFull {
                    size: payload.len(),
                })
            }
            Err(e) => {
                self.stats.lock().errors += 1;
                Err(self.fail(TransportError::io("datagram send", e)))
            }
        }
    }

    /// Write one chunk as one datagram
    ///
    /// Returns `false` when the send buffer refused the chunk; wait for
    /// [`EgressAdapter::writable`] and write it again.
    pub fn write(&self, chunk: &[u8]) -> Result<bool> {
        match self.send(chunk) {
            Ok(_) => Ok(true),
            Err(TransportError::SendBufferFull { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Wait until a write can succeed
    pub async fn writable(&self) -> Result<()> {
        poll_fn(|cx| self.poll_writable(cx)).await
    }

    pub fn poll_writable(&self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.ensure_active()?;

        let ready = {
            let socket = self.socket.read();
            let Some(socket) = socket.as_ref() else {
                return Poll::Ready(Err(TransportError::Closed));
            };
            ready!(socket.poll_send_ready(cx))
        };

        match ready {
            Ok(()) => Poll::Ready(Ok(())),
            Err(e) => Poll::Ready(Err(self.fail(TransportError::io("send readiness", e)))),
        }
    }

    /// Release the endpoint
    ///
    /// Idempotent. A chunk still parked in the sink is discarded.
    pub async fn close(&self) -> Result<()> {
        if self.release()? == CloseStep::InFlight {
            self.lifecycle.wait_released().await;
        }
        Ok(())
    }

    fn release(&self) -> Result<CloseStep> {
        let step = self.lifecycle.begin_close()?;
        if step == CloseStep::Start {
            info!(peer = %self.peer, "Closing egress adapter");
            drop(self.socket.write().take());
            self.lifecycle.released();
        }
        Ok(step)
    }

    /// Fatal error: emit it, release the endpoint, hand it back
    fn fail(&self, error: TransportError) -> TransportError {
        if self.lifecycle.fail(error.clone()) {
            drop(self.socket.write().take());
            self.lifecycle.released();
        }
        error
    }

    fn ensure_active(&self) -> Result<()> {
        match self.lifecycle.state() {
            LifecycleState::Active => Ok(()),
            LifecycleState::Closing | LifecycleState::Closed | LifecycleState::Failed => {
                Err(TransportError::Closed)
            }
            state => Err(TransportError::NotReady { state }),
        }
    }

    fn poll_flush_parked(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        loop {
            let Some(chunk) = self.parked.clone() else {
                return Poll::Ready(Ok(()));
            };

            ready!(self.poll_writable(cx))?;
            if self.write(&chunk)? {
                self.parked = None;
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.lifecycle.subscribe()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Connected remote endpoint
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Remote IP in textual form
    pub fn address(&self) -> String {
        self.peer.ip().to_string()
    }

    /// Remote port
    pub fn port(&self) -> u16 {
        self.peer.port()
    }

    pub fn family(&self) -> SocketFamily {
        self.config.family
    }

    pub fn config(&self) -> &EgressConfig {
        &self.config
    }

    pub fn stats(&self) -> EgressStats {
        self.stats.lock().clone()
    }
}

impl Sink<Bytes> for EgressAdapter {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.get_mut().poll_flush_parked(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Bytes) -> Result<()> {
        let this = self.get_mut();
        if !this.write(&item)? {
            this.parked = Some(item);
        }
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.get_mut().poll_flush_parked(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = self.get_mut();

        if this.closing.get_mut().is_none() {
            ready!(this.poll_flush_parked(cx))?;
            if this.release()? != CloseStep::InFlight {
                return Poll::Ready(Ok(()));
            }

            let mut watch = this.lifecycle.watch();
            *this.closing.get_mut() = Some(
                async move {
                    let _ = watch.wait_for(|snapshot| snapshot.released).await;
                }
                .boxed(),
            );
        }

        let closing = this.closing.get_mut();
        if let Some(wait) = closing.as_mut() {
            ready!(wait.poll_unpin(cx));
        }
        *closing = None;
        Poll::Ready(Ok(()))
    }
}

impl Drop for EgressAdapter {
    fn drop(&mut self) {
        if !self.lifecycle.state().is_terminal() {
            debug!(peer = %self.peer, "Egress adapter dropped without close");
            let _ = self.release();
        }
    }
}

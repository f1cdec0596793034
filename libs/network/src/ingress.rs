//! Ingress Adapter
//!
//! ## Purpose
//!
//! Binds a local datagram endpoint and turns every arriving datagram into
//! one [`IngressMessage`] for a pull-based consumer, framed according to the
//! configured [`Framing`].
//!
//! ## Architecture
//!
//! ```text
//! socket ──► listener task ──► frame ──► BackpressureQueue ──► ReadBuffer ──► Stream
//!                 │                         (pending)          (≤ high-water mark)
//!                 └── stop signal (close / drop)
//! ```
//!
//! The listener task owns the socket exclusively. Delivery state is shared
//! with the adapter behind a mutex that is never held across an await, so
//! arrivals and consumer reads interleave safely on any runtime flavour.
//! The socket is never paused: while the consumer sits above its high-water
//! mark, arrivals queue in order and are replayed on the next read.

use crate::error::{Result, TransportError};
use crate::framing::{Framing, IngressMessage};
use crate::lifecycle::{
    AdapterEvent, CloseStep, Lifecycle, LifecycleState, Role, EVENT_CHANNEL_CAPACITY,
};
use crate::queue::{BackpressureQueue, Offer, PushTarget};
use crate::stats::IngressStats;
use crate::transport::{endpoint_label, DatagramSocket, NetworkProvider, TokioNetworkProvider};
use bytes::Bytes;
use dgram_config::{IngressConfig, SocketFamily};
use futures::future::poll_fn;
use futures::Stream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Consumer-facing buffer; wants more until the high-water mark is reached
#[derive(Debug)]
struct ReadBuffer {
    items: VecDeque<IngressMessage>,
    high_water_mark: usize,
}

impl ReadBuffer {
    fn has_room(&self) -> bool {
        self.items.len() < self.high_water_mark
    }
}

impl PushTarget<IngressMessage> for ReadBuffer {
    fn push(&mut self, item: IngressMessage) -> bool {
        self.items.push_back(item);
        self.has_room()
    }
}

#[derive(Debug)]
struct Delivery {
    readable: ReadBuffer,
    pending: BackpressureQueue<IngressMessage>,
    waker: Option<Waker>,
    failure: Option<TransportError>,
    finished: bool,
    stats: IngressStats,
}

impl Delivery {
    fn new(high_water_mark: usize) -> Self {
        Self {
            readable: ReadBuffer {
                items: VecDeque::new(),
                high_water_mark,
            },
            pending: BackpressureQueue::new(),
            waker: None,
            failure: None,
            finished: false,
            stats: IngressStats::default(),
        }
    }

    fn offer(&mut self, message: IngressMessage) -> Result<Offer> {
        if self.finished {
            self.stats.dropped += 1;
            return Err(TransportError::Closed);
        }

        let outcome = self.pending.offer(message, &mut self.readable);
        match outcome {
            Offer::Delivered => self.stats.delivered_direct += 1,
            Offer::Queued => {
                self.stats.queued += 1;
                self.stats.peak_pending = self.pending.peak_len();
            }
        }

        self.wake();
        Ok(outcome)
    }

    /// Move pending messages into the read buffer while it has room
    fn pull(&mut self) -> usize {
        if !self.readable.has_room() {
            return 0;
        }
        self.pending.pull(&mut self.readable)
    }

    fn next_message(&mut self) -> Option<IngressMessage> {
        if self.readable.items.is_empty() {
            self.pull();
        }

        let message = self.readable.items.pop_front()?;
        self.stats.consumed += 1;
        self.pull();
        Some(message)
    }

    fn poll_message(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<IngressMessage>>> {
        if let Some(message) = self.next_message() {
            return Poll::Ready(Some(Ok(message)));
        }

        if let Some(error) = self.failure.take() {
            return Poll::Ready(Some(Err(error)));
        }

        if self.finished {
            return Poll::Ready(None);
        }

        self.waker = Some(cx.waker().clone());
        Poll::Pending
    }

    /// Stop delivery and drop everything not yet read
    fn discard(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let dropped = self.readable.items.len() + self.pending.clear();
        self.readable.items.clear();
        if dropped > 0 {
            debug!("Discarding {} undelivered messages", dropped);
        }
        self.stats.dropped += dropped as u64;
        self.wake();
    }

    fn fail(&mut self, error: TransportError) {
        if self.finished {
            return;
        }
        self.discard();
        self.failure = Some(error);
    }

    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

/// State shared between the adapter and its listener task
#[derive(Debug)]
struct Shared {
    delivery: Mutex<Delivery>,
    lifecycle: Lifecycle,
    framing: Framing,
}

impl Shared {
    fn accept(&self, payload: Bytes, source: SocketAddr) -> Result<Offer> {
        let len = payload.len();
        let framed = self.framing.frame(payload, source);

        let mut delivery = self.delivery.lock();
        delivery.stats.record_arrival(len);

        match framed {
            Ok(message) => delivery.offer(message),
            Err(e) => {
                delivery.stats.dropped += 1;
                Err(e.into())
            }
        }
    }

    fn fail(&self, error: TransportError) {
        if self.lifecycle.fail(error.clone()) {
            self.delivery.lock().fail(error);
        }
    }
}

/// Receive loop; exits on stop signal, dropped adapter or socket error
async fn listen<S: DatagramSocket>(
    mut socket: S,
    shared: Arc<Shared>,
    mut stop: oneshot::Receiver<()>,
) {
    enum Exit {
        Stopped,
        Abandoned,
        Failed(TransportError),
    }

    let exit = loop {
        tokio::select! {
            biased;

            signal = &mut stop => {
                break match signal {
                    Ok(()) => Exit::Stopped,
                    Err(_) => Exit::Abandoned,
                };
            }

            received = socket.recv_from() => match received {
                Ok((payload, source)) => match shared.accept(payload, source) {
                    Ok(_) => {}
                    Err(TransportError::Closed) => {}
                    Err(e) => warn!(%source, error = %e, "Dropping datagram that cannot be framed"),
                },
                Err(e) => break Exit::Failed(TransportError::io("datagram receive", e)),
            },
        }
    };

    match exit {
        Exit::Stopped => {
            debug!("Ingress listener detached");
            drop(socket);
        }
        Exit::Abandoned => {
            debug!("Ingress adapter dropped; releasing endpoint");
            let claimed = matches!(shared.lifecycle.begin_close(), Ok(CloseStep::Start));
            shared.delivery.lock().discard();
            drop(socket);
            if claimed {
                shared.lifecycle.released();
            }
        }
        Exit::Failed(error) => {
            shared.fail(error);
            drop(socket);
            shared.lifecycle.released();
        }
    }
}

/// Builder that allows observing `Ready` before the endpoint is bound
pub struct IngressBuilder<N = TokioNetworkProvider> {
    config: IngressConfig,
    provider: N,
    events: broadcast::Sender<AdapterEvent>,
}

impl IngressBuilder<TokioNetworkProvider> {
    pub fn new(config: IngressConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            provider: TokioNetworkProvider::new(),
            events,
        }
    }
}

impl<N: NetworkProvider> IngressBuilder<N> {
    /// Acquire the endpoint from another provider
    pub fn with_provider<M: NetworkProvider>(self, provider: M) -> IngressBuilder<M> {
        IngressBuilder {
            config: self.config,
            provider,
            events: self.events,
        }
    }

    /// Receive lifecycle notifications, including `Ready`
    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events.subscribe()
    }

    /// Bind the endpoint and start listening
    ///
    /// Resolves once the endpoint is active. On failure the lifecycle ends in
    /// `Failed`, subscribers see `Error` then `Close`, and no `Ready` is sent.
    /// Dropping the returned future before it resolves releases anything
    /// acquired so far.
    pub async fn bind(self) -> Result<IngressAdapter> {
        let IngressBuilder {
            config,
            provider,
            events,
        } = self;

        config
            .validate_settings()
            .map_err(|e| TransportError::configuration(e.to_string(), Some(e.field)))?;

        let lifecycle = Lifecycle::with_events("ingress", events);
        lifecycle.begin_acquire(Role::Bind)?;

        let (socket, local) = match acquire(&provider, &config).await {
            Ok(acquired) => acquired,
            Err(error) => {
                lifecycle.fail(error.clone());
                lifecycle.released();
                return Err(error);
            }
        };

        let framing = Framing::from_config(&config);
        let shared = Arc::new(Shared {
            delivery: Mutex::new(Delivery::new(config.high_water_mark)),
            lifecycle,
            framing,
        });
        shared.lifecycle.acquired(local, None)?;

        let (stop, stop_rx) = oneshot::channel();
        let listener = tokio::spawn(listen(socket, shared.clone(), stop_rx));

        info!(%local, ?framing, "Ingress adapter listening");

        Ok(IngressAdapter {
            shared,
            config,
            local,
            stop: Mutex::new(Some(stop)),
            listener: Mutex::new(Some(listener)),
        })
    }
}

async fn acquire<N: NetworkProvider>(
    provider: &N,
    config: &IngressConfig,
) -> Result<(N::Socket, SocketAddr)> {
    let host = config.bind_address();
    let addr = provider
        .resolve(host, config.port, config.family)
        .await
        .map_err(|e| TransportError::bind(endpoint_label(host, config.port), e))?;

    let mut socket = provider
        .bind(addr)
        .await
        .map_err(|e| TransportError::bind(addr, e))?;
    socket.set_recv_buffer_size(config.recv_buffer_size);

    let local = socket
        .local_addr()
        .map_err(|e| TransportError::bind(addr, e))?;

    Ok((socket, local))
}

/// Bound datagram source exposed as a pull-based stream
///
/// Meant for a single consumer: concurrent readers share one wake slot.
#[derive(Debug)]
pub struct IngressAdapter {
    shared: Arc<Shared>,
    config: IngressConfig,
    local: SocketAddr,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl IngressAdapter {
    /// Bind with the real UDP provider
    pub async fn bind(config: IngressConfig) -> Result<Self> {
        IngressBuilder::new(config).bind().await
    }

    /// Next message; `None` once the adapter is torn down
    ///
    /// A fatal transport error is yielded once before the end.
    pub async fn recv(&self) -> Option<Result<IngressMessage>> {
        poll_fn(|cx| self.shared.delivery.lock().poll_message(cx)).await
    }

    /// Next message if one is ready, without waiting
    pub fn try_recv(&self) -> Option<IngressMessage> {
        self.shared.delivery.lock().next_message()
    }

    /// Signal consumer readiness; returns how many queued messages moved
    pub fn pull(&self) -> usize {
        self.shared.delivery.lock().pull()
    }

    /// Inject a datagram as if `source` had sent `body`
    ///
    /// Goes through the same framing and backpressure path as socket
    /// arrivals. Fails with `Closed` after teardown.
    pub fn handle_message(&self, body: Bytes, source: SocketAddr) -> Result<Offer> {
        self.shared.accept(body, source)
    }

    /// Stop listening and release the endpoint
    ///
    /// Idempotent; concurrent callers all return once the endpoint is gone.
    /// Undelivered messages are discarded.
    pub async fn close(&self) -> Result<()> {
        match self.shared.lifecycle.begin_close()? {
            CloseStep::Start => {
                info!(local = %self.local, "Closing ingress adapter");
                self.shared.delivery.lock().discard();

                if let Some(stop) = self.stop.lock().take() {
                    let _ = stop.send(());
                }

                let listener = self.listener.lock().take();
                if let Some(listener) = listener {
                    if let Err(e) = listener.await {
                        warn!(error = %e, "Ingress listener ended abnormally");
                    }
                }

                self.shared.lifecycle.released();
            }
            CloseStep::InFlight => self.shared.lifecycle.wait_released().await,
            CloseStep::Done => {}
        }

        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.shared.lifecycle.subscribe()
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.lifecycle.state()
    }

    /// Bound address as reported by the endpoint
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Bound IP in textual form
    pub fn address(&self) -> String {
        self.local.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.local.port()
    }

    pub fn family(&self) -> SocketFamily {
        self.config.family
    }

    pub fn headless(&self) -> bool {
        self.shared.framing == Framing::Headless
    }

    pub fn structured(&self) -> bool {
        self.shared.framing == Framing::Structured
    }

    pub fn framing(&self) -> Framing {
        self.shared.framing
    }

    pub fn config(&self) -> &IngressConfig {
        &self.config
    }

    /// Whether the next arrival is handed straight to the consumer buffer
    pub fn allow_push(&self) -> bool {
        self.shared.delivery.lock().pending.is_accepting()
    }

    /// Messages held back by backpressure
    pub fn pending_len(&self) -> usize {
        self.shared.delivery.lock().pending.len()
    }

    /// Messages ready to read
    pub fn buffered_len(&self) -> usize {
        self.shared.delivery.lock().readable.items.len()
    }

    pub fn stats(&self) -> IngressStats {
        self.shared.delivery.lock().stats.clone()
    }
}

impl Stream for IngressAdapter {
    type Item = Result<IngressMessage>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.shared.delivery.lock().poll_message(cx)
    }
}

impl Drop for IngressAdapter {
    fn drop(&mut self) {
        if !self.shared.lifecycle.state().is_terminal() {
            debug!(local = %self.local, "Ingress adapter dropped without close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryNetwork;
    use futures::StreamExt;

    fn source() -> SocketAddr {
        "127.0.0.1:45007".parse().unwrap()
    }

    async fn bind_memory(config: IngressConfig) -> (IngressAdapter, MemoryNetwork) {
        let network = MemoryNetwork::new();
        let adapter = IngressBuilder::new(config.with_port(0))
            .with_provider(network.clone())
            .bind()
            .await
            .unwrap();
        (adapter, network)
    }

    #[tokio::test]
    async fn test_handle_message_respects_high_water_mark() {
        let (adapter, _network) =
            bind_memory(IngressConfig::default().with_high_water_mark(2)).await;

        for i in 0..5u8 {
            adapter.handle_message(Bytes::from(vec![i]), source()).unwrap();
        }

        assert_eq!(adapter.buffered_len(), 2);
        assert_eq!(adapter.pending_len(), 3);
        assert!(!adapter.allow_push());

        for i in 0..5u8 {
            let message = adapter.try_recv().unwrap();
            assert_eq!(message, IngressMessage::Payload(Bytes::from(vec![i])));
        }

        assert!(adapter.try_recv().is_none());
        assert_eq!(adapter.pull(), 0);
        assert!(adapter.allow_push());
        assert_eq!(adapter.stats().consumed, 5);
    }

    #[tokio::test]
    async fn test_headered_handle_message() {
        let (adapter, _network) = bind_memory(IngressConfig::default().with_headless(false)).await;

        assert!(!adapter.headless());
        assert!(!adapter.structured());
        adapter
            .handle_message(Bytes::from_static(b"abc"), source())
            .unwrap();

        let message = adapter.try_recv().unwrap();
        let bytes = message.as_bytes().unwrap();
        assert_eq!(&bytes[..5], &[0x00, 0x03, 0x04, 0xAF, 0xCF]);
        assert_eq!(&bytes[5..], b"127.0.0.1abc");
    }

    #[tokio::test]
    async fn test_close_ends_stream_and_discards() {
        let (mut adapter, network) = bind_memory(IngressConfig::default()).await;
        let local = adapter.local_addr();
        assert!(network.is_bound(local));

        adapter
            .handle_message(Bytes::from_static(b"late"), source())
            .unwrap();
        adapter.close().await.unwrap();

        assert_eq!(adapter.state(), LifecycleState::Closed);
        assert!(!network.is_bound(local));
        assert!(adapter.next().await.is_none());
        assert!(matches!(
            adapter.handle_message(Bytes::from_static(b"x"), source()),
            Err(TransportError::Closed)
        ));
        assert_eq!(adapter.stats().dropped, 2);

        adapter.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_releases_endpoint() {
        let (adapter, network) = bind_memory(IngressConfig::default()).await;
        let mut events = adapter.subscribe();
        let local = adapter.local_addr();

        drop(adapter);

        assert!(matches!(events.recv().await.unwrap(), AdapterEvent::Close));
        assert!(!network.is_bound(local));
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_bind() {
        let network = MemoryNetwork::new();
        let err = IngressBuilder::new(IngressConfig::default().with_high_water_mark(0))
            .with_provider(network.clone())
            .bind()
            .await
            .unwrap_err();

        assert_eq!(err.category(), "configuration");
        assert!(matches!(
            err,
            TransportError::Configuration { field: Some(ref field), .. }
                if field == "high_water_mark"
        ));
        assert_eq!(network.endpoint_count(), 0);
    }

    #[tokio::test]
    async fn test_address_of_wrong_family_is_bind_failure() {
        let network = MemoryNetwork::new();
        let config = IngressConfig::default().with_address("::1").with_port(0);
        let builder = IngressBuilder::new(config).with_provider(network.clone());
        let mut events = builder.subscribe();

        let err = builder.bind().await.unwrap_err();
        assert!(matches!(err, TransportError::Bind { .. }));
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::InvalidInput));
        assert!(err.is_fatal());

        assert!(matches!(events.recv().await.unwrap(), AdapterEvent::Error(_)));
        assert!(matches!(events.recv().await.unwrap(), AdapterEvent::Close));
        assert!(events.recv().await.is_err());
        assert_eq!(network.endpoint_count(), 0);
    }
}

//! # Datagram Stream Adapters
//!
//! ## Purpose
//!
//! Presents UDP endpoints as streams:
//! - [`IngressAdapter`]: a bound endpoint read as a pull-based
//!   [`Stream`](futures::Stream) of [`IngressMessage`]s, with an in-order
//!   backpressure queue between the socket and the consumer
//! - [`EgressAdapter`]: a connected endpoint written one datagram per chunk,
//!   also usable as a [`Sink`](futures::Sink)
//!
//! Both share the [`lifecycle`] state machine and publish [`AdapterEvent`]s.
//!
//! ## Architecture Role
//!
//! ```text
//! dgram-config ──► IngressBuilder / EgressBuilder
//!                         │
//!               NetworkProvider (UDP | memory)
//!                         │
//! dgram-codec  ──► framing ──► BackpressureQueue ──► consumer
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use dgram_config::{EgressConfig, IngressConfig};
//! use dgram_stream::{EgressAdapter, IngressAdapter};
//! use futures::StreamExt;
//!
//! # async fn example() -> dgram_stream::Result<()> {
//! let mut ingress = IngressAdapter::bind(IngressConfig::default().with_port(0)).await?;
//! let egress = EgressAdapter::connect(EgressConfig::default().with_port(ingress.port())).await?;
//!
//! egress.send(b"hello")?;
//! if let Some(message) = ingress.next().await {
//!     println!("received {} bytes", message?.len());
//! }
//!
//! egress.close().await?;
//! ingress.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod egress;
pub mod error;
pub mod framing;
pub mod ingress;
pub mod lifecycle;
pub mod queue;
pub mod stats;
pub mod transport;

pub use egress::{EgressAdapter, EgressBuilder};
pub use error::{Result, TransportError};
pub use framing::{Framing, IngressMessage};
pub use ingress::{IngressAdapter, IngressBuilder};
pub use lifecycle::{AdapterEvent, Lifecycle, LifecycleEvent, LifecycleState, Role};
pub use queue::{BackpressureQueue, Offer, PushTarget};
pub use stats::{EgressStats, IngressStats};
pub use transport::{
    DatagramSocket, MemoryNetwork, MemorySocket, NetworkProvider, TokioNetworkProvider,
    UdpDatagramSocket,
};

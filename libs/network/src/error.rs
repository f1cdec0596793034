//! Transport Error Types
//!
//! Error taxonomy for the datagram adapters: endpoint acquisition failures,
//! runtime I/O failures, data-level codec failures and caller misuse.
//!
//! Resource-level errors (bind, connect, I/O) are fatal to the adapter that
//! raised them and are never retried internally. Codec errors are local to a
//! single call and leave the adapter untouched.

use crate::lifecycle::{LifecycleEvent, LifecycleState};
use dgram_codec::ProtocolError;
use std::io;
use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Binding the ingress endpoint failed
    #[error("Bind error: failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Connecting the egress endpoint failed
    #[error("Connect error: failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Runtime I/O failure on a live endpoint
    #[error("I/O error during {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Malformed header; local to the decode call
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration rejected before any socket was created
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Operation requires an active adapter
    #[error("Adapter not ready: current state is {state}")]
    NotReady { state: LifecycleState },

    /// The OS send buffer refused the datagram; nothing was sent
    #[error("Send buffer full: datagram of {size} bytes was not sent")]
    SendBufferFull { size: usize },

    /// Operation on an adapter that has been torn down
    #[error("Adapter closed")]
    Closed,

    /// Lifecycle event that has no handler in the current state
    #[error("Invalid lifecycle transition: {event} while {from}")]
    InvalidTransition {
        from: LifecycleState,
        event: LifecycleEvent,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a bind error
    pub fn bind(addr: impl ToString, source: io::Error) -> Self {
        Self::Bind {
            addr: addr.to_string(),
            source,
        }
    }

    /// Create a connect error
    pub fn connect(addr: impl ToString, source: io::Error) -> Self {
        Self::Connect {
            addr: addr.to_string(),
            source,
        }
    }

    /// Create a runtime I/O error
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Whether the error tears the adapter down
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Bind { .. }
                | TransportError::Connect { .. }
                | TransportError::Io { .. }
        )
    }

    /// Whether retrying the same call later can succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::SendBufferFull { .. })
    }

    /// Get error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Bind { .. } => "bind",
            TransportError::Connect { .. } => "connect",
            TransportError::Io { .. } => "io",
            TransportError::Protocol(_) => "protocol",
            TransportError::Configuration { .. } => "configuration",
            TransportError::NotReady { .. } => "not_ready",
            TransportError::SendBufferFull { .. } => "send_buffer_full",
            TransportError::Closed => "closed",
            TransportError::InvalidTransition { .. } => "lifecycle",
        }
    }

    /// Underlying I/O error kind, if any
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            TransportError::Bind { source, .. }
            | TransportError::Connect { source, .. }
            | TransportError::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

// io::Error is not Clone; the copy keeps the kind and the rendered message
fn clone_io(source: &io::Error) -> io::Error {
    io::Error::new(source.kind(), source.to_string())
}

impl Clone for TransportError {
    fn clone(&self) -> Self {
        match self {
            TransportError::Bind { addr, source } => TransportError::Bind {
                addr: addr.clone(),
                source: clone_io(source),
            },
            TransportError::Connect { addr, source } => TransportError::Connect {
                addr: addr.clone(),
                source: clone_io(source),
            },
            TransportError::Io { context, source } => TransportError::Io {
                context: context.clone(),
                source: clone_io(source),
            },
            TransportError::Protocol(error) => TransportError::Protocol(error.clone()),
            TransportError::Configuration { message, field } => TransportError::Configuration {
                message: message.clone(),
                field: field.clone(),
            },
            TransportError::NotReady { state } => TransportError::NotReady { state: *state },
            TransportError::SendBufferFull { size } => {
                TransportError::SendBufferFull { size: *size }
            }
            TransportError::Closed => TransportError::Closed,
            TransportError::InvalidTransition { from, event } => {
                TransportError::InvalidTransition {
                    from: *from,
                    event: *event,
                }
            }
        }
    }
}

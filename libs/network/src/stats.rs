//! Adapter statistics

use std::time::Instant;

/// Ingress counters
#[derive(Debug, Clone, Default)]
pub struct IngressStats {
    pub datagrams_received: u64,
    pub bytes_received: u64,
    /// Handed to the consumer buffer immediately
    pub delivered_direct: u64,
    /// Held in the backpressure queue first
    pub queued: u64,
    /// Read by the consumer
    pub consumed: u64,
    /// Framing failures and arrivals after teardown
    pub dropped: u64,
    /// Largest backpressure queue length seen
    pub peak_pending: usize,
    pub last_activity: Option<Instant>,
}

impl IngressStats {
    pub(crate) fn record_arrival(&mut self, len: usize) {
        self.datagrams_received += 1;
        self.bytes_received += len as u64;
        self.last_activity = Some(Instant::now());
    }
}

/// Egress counters
#[derive(Debug, Clone, Default)]
pub struct EgressStats {
    pub datagrams_sent: u64,
    pub bytes_sent: u64,
    /// Sends refused because the send buffer was full
    pub refused: u64,
    pub errors: u64,
    pub last_activity: Option<Instant>,
}

impl EgressStats {
    pub(crate) fn record_send(&mut self, len: usize) {
        self.datagrams_sent += 1;
        self.bytes_sent += len as u64;
        self.last_activity = Some(Instant::now());
    }
}

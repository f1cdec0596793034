//! Endpoint defaults
//!
//! Values used when a configuration omits a field, shared by both adapters so
//! an ingress and an egress built from defaults talk to each other.

/// Port used by both adapters when none is configured
pub const DEFAULT_PORT: u16 = 44002;

/// Default bind/remote address for IPv4 endpoints
pub const DEFAULT_ADDRESS_V4: &str = "127.0.0.1";

/// Default bind/remote address for IPv6 endpoints
pub const DEFAULT_ADDRESS_V6: &str = "::1";

/// Messages the consumer-facing buffer holds before signalling backpressure
pub const DEFAULT_HIGH_WATER_MARK: usize = 16;

/// Receive buffer per datagram; large enough for any UDP payload
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65535;

/// Largest payload a UDP datagram can carry over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// Prefix for environment variable overrides (`DGRAM_INGRESS__PORT`)
pub const ENV_PREFIX: &str = "DGRAM";

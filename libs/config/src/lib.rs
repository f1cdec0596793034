//! # Datagram Endpoint Configuration
//!
//! Construction-time configuration for the ingress and egress adapters,
//! plus the defaults both sides share.
//!
//! ## Features
//!
//! - **Endpoint Types**: [`IngressConfig`], [`EgressConfig`], [`SocketFamily`]
//! - **Defaults**: well-known port, loopback per family, buffer sizes
//! - **Loading**: TOML file + `DGRAM_*` environment overrides
//!
//! ## Usage
//!
//! ```rust
//! use dgram_config::{IngressConfig, DEFAULT_PORT};
//!
//! let config = IngressConfig::default().with_port(0).with_headless(false);
//! assert_eq!(config.bind_address(), "127.0.0.1");
//! assert_ne!(config.port, DEFAULT_PORT);
//! ```

pub mod defaults;
pub mod endpoint;
pub mod loader;

// Re-export commonly used types
pub use defaults::*;
pub use endpoint::{EgressConfig, IngressConfig, InvalidSetting, SocketFamily};
pub use loader::DatagramConfig;

//! Configuration loading
//!
//! Reads `[ingress]` and `[egress]` tables from a TOML file and applies
//! `DGRAM_`-prefixed environment overrides on top, e.g.
//! `DGRAM_INGRESS__PORT=9000` or `DGRAM_EGRESS__HOST=::1`.

use crate::defaults::ENV_PREFIX;
use crate::endpoint::{EgressConfig, IngressConfig};
use anyhow::{Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Both adapter configurations, as stored on disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatagramConfig {
    pub ingress: IngressConfig,
    pub egress: EgressConfig,
}

impl DatagramConfig {
    /// Load from an optional file with environment overrides
    ///
    /// A missing `path` yields defaults plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Same as [`DatagramConfig::load`] with a custom environment prefix
    pub fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let defaults = toml::to_string(&Self::default())
            .context("Failed to serialize default configuration")?;

        let mut builder =
            Config::builder().add_source(File::from_str(&defaults, FileFormat::Toml));

        if let Some(path) = path {
            info!("Loading datagram config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        debug!("Loaded datagram config: {:?}", config);

        Ok(config)
    }

    /// Parse a TOML document directly, without environment overrides
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.ingress
            .validate()
            .context("Invalid [ingress] configuration")?;
        self.egress
            .validate()
            .context("Invalid [egress] configuration")?;
        Ok(())
    }
}

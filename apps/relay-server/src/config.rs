//! Server configuration
//!
//! Read from environment variables at startup. Every field has a default
//! so the relay runs with no configuration at all.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use session_registry::DEFAULT_EXPIRY_HORIZON;

/// Relay configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (`SOTTO_BIND_ADDR`)
    pub bind_addr: SocketAddr,
    /// Explicit public base address for shareable links
    /// (`SOTTO_PUBLIC_ORIGIN`). When unset, the origin is derived from the
    /// upgrade request's forwarded-proto and host headers.
    pub public_origin: Option<String>,
    /// Hard session lifetime (`SOTTO_SESSION_TTL_SECS`)
    pub expiry_horizon: Duration,
    /// How often the background sweep runs (`SOTTO_SWEEP_INTERVAL_SECS`)
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            public_origin: None,
            expiry_horizon: DEFAULT_EXPIRY_HORIZON,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(v) = env::var("SOTTO_BIND_ADDR") {
            config.bind_addr = v.parse().context("invalid SOTTO_BIND_ADDR")?;
        }
        if let Ok(v) = env::var("SOTTO_PUBLIC_ORIGIN") {
            config.public_origin = Some(v);
        }
        if let Ok(v) = env::var("SOTTO_SESSION_TTL_SECS") {
            let secs: u64 = v.parse().context("invalid SOTTO_SESSION_TTL_SECS")?;
            config.expiry_horizon = Duration::from_secs(secs);
        }
        if let Ok(v) = env::var("SOTTO_SWEEP_INTERVAL_SECS") {
            let secs: u64 = v.parse().context("invalid SOTTO_SWEEP_INTERVAL_SECS")?;
            config.sweep_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

//! # Server Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file (or no file) gives the production setup.
//!
//! ```toml
//! bind_address = "0.0.0.0:27901"
//! session_ttl_ms = 30000
//! retry_interval_ms = 500
//! max_datagram_size = 1024
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{NatNegError, NatNegResult};
use crate::{MAX_DATAGRAM_SIZE, RETRY_INTERVAL, SESSION_TTL};

/// Server configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NatNegConfig {
    /// UDP address to bind.
    pub bind_address: SocketAddr,
    /// Session lifetime from creation, in milliseconds.
    pub session_ttl_ms: u64,
    /// Delay between connect request retries, in milliseconds.
    pub retry_interval_ms: u64,
    /// Receive buffer size; longer datagrams are truncated.
    pub max_datagram_size: usize,
}

impl Default for NatNegConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], gamespy_common::NATNEG_PORT)),
            session_ttl_ms: duration_ms(SESSION_TTL),
            retry_interval_ms: duration_ms(RETRY_INTERVAL),
            max_datagram_size: MAX_DATAGRAM_SIZE,
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl NatNegConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> NatNegResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| NatNegError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> NatNegResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| NatNegError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> NatNegResult<()> {
        if self.session_ttl_ms == 0 {
            return Err(NatNegError::Config("session_ttl_ms must be positive".into()));
        }
        if self.retry_interval_ms == 0 {
            return Err(NatNegError::Config("retry_interval_ms must be positive".into()));
        }
        if self.max_datagram_size < crate::protocol::PacketHeader::SIZE {
            return Err(NatNegError::Config(format!(
                "max_datagram_size must hold at least a {} byte header",
                crate::protocol::PacketHeader::SIZE
            )));
        }
        Ok(())
    }

    /// Session lifetime.
    #[inline]
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_millis(self.session_ttl_ms)
    }

    /// Connect request retry delay.
    #[inline]
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

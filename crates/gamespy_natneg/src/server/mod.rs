//! # NATNEG Server
//!
//! The listener that owns the UDP socket and drives every session.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       NATNEG SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │ Receive loop │  │ Retry tasks  │  │ Expiry timers│       │
//! │  │ (one socket) │  │ (per edge)   │  │ (per session)│       │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘       │
//! │         └─────────────────┼─────────────────┘               │
//! │              ┌────────────▼────────────┐                    │
//! │              │ SessionRegistry         │                    │
//! │              │ cookie -> Session       │                    │
//! │              └─────────────────────────┘                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Handlers run synchronously under the session lock and queue their
//! replies. The listener sends once the lock is released; no lock is ever
//! held across an `.await`.

mod stats;

pub use stats::{ServerStats, ServerStatsSnapshot};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::NatNegConfig;
use crate::error::{ErrorKind, NatNegResult};
use crate::protocol::PacketHeader;
use crate::session::{spawn_retry, SessionRegistry};
use crate::transport::{TransportStats, UdpTransport};

/// The NATNEG coordinator.
#[derive(Debug)]
pub struct NatNegServer {
    config: NatNegConfig,
    transport: Arc<UdpTransport>,
    registry: Arc<SessionRegistry>,
    stats: Arc<ServerStats>,
}

impl NatNegServer {
    /// Validates the configuration and binds the socket.
    pub async fn bind(config: NatNegConfig) -> NatNegResult<Self> {
        config.validate()?;
        let transport = UdpTransport::bind(config.bind_address).await?;
        tracing::info!("Listening on {}", transport.local_addr());

        Ok(Self {
            config,
            transport: Arc::new(transport),
            registry: Arc::new(SessionRegistry::new()),
            stats: Arc::new(ServerStats::new()),
        })
    }

    /// Bound address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &NatNegConfig {
        &self.config
    }

    /// Session table.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Server counters.
    #[must_use]
    pub fn stats(&self) -> ServerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Socket counters.
    #[must_use]
    pub fn transport_stats(&self) -> TransportStats {
        self.transport.stats()
    }

    /// Serves forever.
    pub async fn run(&self) {
        self.run_until(std::future::pending()).await;
    }

    /// Serves until `shutdown` completes.
    ///
    /// Sessions still alive at shutdown are abandoned; their timers and
    /// retry tasks die with the runtime.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut buffer = vec![0u8; self.config.max_datagram_size];

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("Shutting down with {} live sessions", self.registry.len());
                    return;
                }
                received = self.transport.recv_from(&mut buffer) => match received {
                    Ok((len, source)) => self.process(source, &buffer[..len]).await,
                    // ICMP port unreachable surfaces here on some platforms
                    Err(e) => tracing::debug!("Receive failed: {}", e),
                },
            }
        }
    }

    async fn process(&self, source: SocketAddr, datagram: &[u8]) {
        let Err(e) = self.handle_datagram(source, datagram).await else {
            return;
        };

        self.stats.record_drop();
        match e.kind() {
            ErrorKind::Malformed => tracing::debug!("[{}] Dropped packet: {}", source, e),
            ErrorKind::ProtocolViolation | ErrorKind::IdentityConflict => {
                tracing::warn!("[{}] Dropped packet: {}", source, e);
            }
            ErrorKind::Local => tracing::error!("[{}] {}", source, e),
        }
    }

    /// Handles one datagram from `source`.
    ///
    /// Replies queued before a handler fails are still sent.
    pub async fn handle_datagram(&self, source: SocketAddr, datagram: &[u8]) -> NatNegResult<()> {
        let (header, payload) = PacketHeader::decode(datagram)?;
        let cookie = header.cookie();

        let Some(command) = header.command() else {
            tracing::warn!(
                "[{:08x}/{}] Received unknown command type: 0x{:02x}",
                cookie, source, header.command
            );
            return Ok(());
        };

        if command.is_stateless() {
            tracing::debug!("[{:08x}/{}] Command: {}", cookie, source, command.name());
            return Ok(());
        }

        let (session, created) = self.registry.lookup_or_create(cookie, header.version);
        if created {
            self.stats.record_session_created();
            tracing::info!("[{:08x}] Created session (version {})", cookie, header.version);
            self.registry.schedule_expiry(
                Arc::clone(&session),
                self.config.session_ttl(),
                Arc::clone(&self.transport),
                Arc::clone(&self.stats),
            );
        }

        session.check_version(header.version)?;

        let mut outbox = Vec::new();
        let result = session.lock().dispatch(&header, payload, source, &mut outbox);

        for transmit in &outbox {
            if let Err(e) = self.transport.send(transmit).await {
                tracing::warn!(
                    "[{:08x}] Send to {} failed: {}",
                    cookie, transmit.destination, e
                );
            }
        }

        for edge in result? {
            spawn_retry(
                Arc::clone(&session),
                edge,
                Arc::clone(&self.transport),
                Arc::clone(&self.stats),
                self.config.retry_interval(),
            );
        }

        Ok(())
    }
}

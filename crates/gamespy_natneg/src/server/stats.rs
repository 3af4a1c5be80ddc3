//! # Server Statistics
//!
//! Counters shared by the listener, retry tasks and expiry timers.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live server counters.
#[derive(Debug, Default)]
pub struct ServerStats {
    sessions_created: AtomicU64,
    sessions_expired: AtomicU64,
    packets_dropped: AtomicU64,
    connect_requests_sent: AtomicU64,
}

/// Point-in-time copy of [`ServerStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServerStatsSnapshot {
    /// Sessions opened since startup.
    pub sessions_created: u64,
    /// Sessions removed by their expiry timer.
    pub sessions_expired: u64,
    /// Packets dropped because of an error.
    pub packets_dropped: u64,
    /// Connect-Request datagrams sent, retries included.
    pub connect_requests_sent: u64,
}

impl ServerStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a new session.
    #[inline]
    pub fn record_session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an expired session.
    #[inline]
    pub fn record_session_expired(&self) {
        self.sessions_expired.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a dropped packet.
    #[inline]
    pub fn record_drop(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a sent Connect-Request.
    #[inline]
    pub fn record_connect_request(&self) {
        self.connect_requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> ServerStatsSnapshot {
        ServerStatsSnapshot {
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_expired: self.sessions_expired.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            connect_requests_sent: self.connect_requests_sent.load(Ordering::Relaxed),
        }
    }
}

//! # Session Registry
//!
//! Cookie -> session table, constructed at startup and shared by the
//! listener and the expiry timers.
//!
//! ## Lifetime
//!
//! A session lives for a fixed time from creation. Traffic never extends
//! it. On expiry the session is closed first (retry tasks see this on their
//! next step), then unlinked, then every client still mid-negotiation gets
//! one forced cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::Session;
use crate::server::ServerStats;
use crate::transport::{Transmit, UdpTransport};

/// Global session table.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<u32, Arc<Session>>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `cookie`, creating it with `version` if absent.
    ///
    /// The flag is true when the session was created by this call; the
    /// caller must then arm its expiry timer.
    pub fn lookup_or_create(&self, cookie: u32, version: u8) -> (Arc<Session>, bool) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get(&cookie) {
            return (Arc::clone(session), false);
        }

        let session = Arc::new(Session::new(cookie, version));
        sessions.insert(cookie, Arc::clone(&session));
        (session, true)
    }

    /// Looks up a live session.
    #[must_use]
    pub fn get(&self, cookie: u32) -> Option<Arc<Session>> {
        self.sessions.lock().get(&cookie).cloned()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// True when no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Closes and unlinks a session, returning the cancellations to send.
    ///
    /// Only the exact session instance is unlinked, so a later session that
    /// reuses the cookie is never removed by an older timer.
    pub fn expire(&self, session: &Arc<Session>) -> Vec<Transmit> {
        session.close();

        {
            let mut sessions = self.sessions.lock();
            let cookie = session.cookie();
            if sessions
                .get(&cookie)
                .is_some_and(|live| Arc::ptr_eq(live, session))
            {
                sessions.remove(&cookie);
            }
        }

        session.lock().cancellations()
    }

    /// Arms the one-shot expiry timer of a freshly created session.
    pub fn schedule_expiry(
        self: &Arc<Self>,
        session: Arc<Session>,
        ttl: Duration,
        transport: Arc<UdpTransport>,
        stats: Arc<ServerStats>,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let deadline = session.created_at() + ttl;

        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;

            let cancellations = registry.expire(&session);
            for transmit in &cancellations {
                if let Err(e) = transport.send(transmit).await {
                    tracing::warn!(
                        "[{:08x}] Cancellation to {} failed: {}",
                        session.cookie(),
                        transmit.destination,
                        e
                    );
                }
            }

            stats.record_session_expired();
            tracing::info!("[{:08x}] Deleted session", session.cookie());
        })
    }
}

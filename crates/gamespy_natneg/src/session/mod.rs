//! # Negotiation Sessions
//!
//! All packets sharing a cookie belong to one session.
//!
//! ## Locking
//!
//! ```text
//! SessionRegistry ── Mutex<HashMap<cookie, Arc<Session>>>   (lookup / insert / delete)
//!        │
//!        └── Session ── Mutex<SessionState>                  (one command at a time)
//!                   └── AtomicBool open                      (read by retry tasks)
//! ```
//!
//! The registry lock is never held while a session lock is taken. Neither
//! lock is ever held across an `.await`: handlers are synchronous and return
//! the datagrams to send.

mod client;
mod handlers;
mod pairing;
mod registry;

pub use client::Client;
pub use pairing::{spawn_retry, EdgeStep, PairingEdge};
pub use registry::SessionRegistry;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tokio::time::Instant;

use crate::error::{NatNegError, NatNegResult};

/// One negotiation, identified by its cookie.
#[derive(Debug)]
pub struct Session {
    cookie: u32,
    version: u8,
    created_at: Instant,
    open: AtomicBool,
    state: Mutex<SessionState>,
}

impl Session {
    /// Opens a session. The version is fixed for its whole lifetime.
    #[must_use]
    pub fn new(cookie: u32, version: u8) -> Self {
        Self {
            cookie,
            version,
            created_at: Instant::now(),
            open: AtomicBool::new(true),
            state: Mutex::new(SessionState::new(cookie, version)),
        }
    }

    /// Session cookie.
    #[inline]
    #[must_use]
    pub fn cookie(&self) -> u32 {
        self.cookie
    }

    /// Protocol version set by the first packet.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Creation time; the expiry deadline counts from here.
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// False once the session has expired.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Marks the session closed. Returns true if it was open.
    pub fn close(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }

    /// Rejects packets whose version differs from the session's.
    pub fn check_version(&self, version: u8) -> NatNegResult<()> {
        if version == self.version {
            Ok(())
        } else {
            Err(NatNegError::VersionMismatch {
                session: self.version,
                packet: version,
            })
        }
    }

    /// Locks the client state.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }
}

/// Client table of one session, guarded by the session lock.
#[derive(Debug)]
pub struct SessionState {
    cookie: u32,
    version: u8,
    game_name: Option<String>,
    clients: BTreeMap<u8, Client>,
}

impl SessionState {
    /// Creates an empty client table.
    #[must_use]
    pub fn new(cookie: u32, version: u8) -> Self {
        Self {
            cookie,
            version,
            game_name: None,
            clients: BTreeMap::new(),
        }
    }

    /// Session cookie.
    #[inline]
    #[must_use]
    pub fn cookie(&self) -> u32 {
        self.cookie
    }

    /// Game name established by the first registered client.
    #[inline]
    #[must_use]
    pub fn game_name(&self) -> Option<&str> {
        self.game_name.as_deref()
    }

    /// Looks up a client by index.
    #[inline]
    #[must_use]
    pub fn client(&self, index: u8) -> Option<&Client> {
        self.clients.get(&index)
    }

    /// Clients in ascending index order.
    pub fn clients(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    /// Number of registered clients.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// True when no client has registered yet.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

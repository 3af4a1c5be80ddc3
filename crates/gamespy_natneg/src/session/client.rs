//! # Negotiation Participant
//!
//! Per-client state inside one session.
//!
//! ## Design
//!
//! - Keyed by the peer-chosen index, never allocated by the server
//! - Addresses are only ever added or overwritten, never cleared
//! - `connected` only grows; rotation resets just the pairing pointer

use std::collections::BTreeSet;
use std::net::{SocketAddr, SocketAddrV4};

use crate::protocol::{InitRequest, PortType};

/// One participant of a negotiation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Client {
    /// Cookie of the owning session.
    pub cookie: u32,
    /// Peer-chosen index.
    pub index: u8,
    /// Index currently targeted; equal to `index` while idle.
    pub connecting_index: u8,
    /// Whether the current target acknowledged the connect request.
    pub connect_ack: bool,
    /// Indices this client has reported connecting to.
    pub connected: BTreeSet<u8>,
    /// Address used for signalling traffic.
    pub negotiate_addr: Option<SocketAddr>,
    /// Self-reported LAN address.
    pub local_addr: Option<SocketAddrV4>,
    /// Address peers should dial for the real connection.
    pub server_addr: Option<SocketAddr>,
    /// Game identifier, equal to the session's game name.
    pub game_name: String,
}

impl Client {
    /// Creates an idle, unmapped client.
    #[must_use]
    pub fn new(cookie: u32, index: u8, game_name: impl Into<String>) -> Self {
        Self {
            cookie,
            index,
            connecting_index: index,
            connect_ack: false,
            connected: BTreeSet::new(),
            negotiate_addr: None,
            local_addr: None,
            server_addr: None,
            game_name: game_name.into(),
        }
    }

    /// Both the signalling and the game address are known.
    #[inline]
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.negotiate_addr.is_some() && self.server_addr.is_some()
    }

    /// Not currently targeting any peer.
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.connecting_index == self.index
    }

    /// Idle and mapped: eligible for pairing.
    #[inline]
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.is_idle() && self.is_mapped()
    }

    /// Whether a connection to `peer` has already been reported.
    #[inline]
    #[must_use]
    pub fn has_connected_to(&self, peer: u8) -> bool {
        self.connected.contains(&peer)
    }

    /// Learns addresses from an Init probe received from `source`.
    ///
    /// Probe sockets reveal the signalling address. The game port, or any
    /// probe when the game port is not used, reveals the address peers dial.
    pub fn learn_addresses(&mut self, request: &InitRequest, source: SocketAddr) {
        if request.port_type != PortType::GamePort {
            self.negotiate_addr = Some(source);
        }
        if request.local_addr.port() != 0 {
            self.local_addr = Some(request.local_addr);
        }
        if !request.use_game_port || request.port_type == PortType::GamePort {
            self.server_addr = Some(source);
        }
    }

    /// Targets `peer` and waits for a fresh acknowledgement.
    pub fn begin_connecting(&mut self, peer: u8) {
        self.connecting_index = peer;
        self.connect_ack = false;
    }

    /// Ends the current attempt after a report.
    ///
    /// Records the target as connected (unless already idle) and returns the
    /// client to idle. Returns the recorded peer.
    pub fn finish_attempt(&mut self) -> Option<u8> {
        let peer = (!self.is_idle()).then_some(self.connecting_index);
        if let Some(peer) = peer {
            self.connected.insert(peer);
        }
        self.connecting_index = self.index;
        self.connect_ack = false;
        peer
    }

    /// Where to send a signalling packet, preferring the negotiate address.
    #[inline]
    #[must_use]
    pub fn signalling_addr(&self) -> Option<SocketAddr> {
        self.negotiate_addr.or(self.server_addr)
    }
}

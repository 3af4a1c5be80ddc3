//! # Pairing Engine
//!
//! Matches idle, mapped clients and keeps re-sending connect requests on
//! every active edge until both ends acknowledge.
//!
//! ## Retry Model
//!
//! ```text
//!  pair_idle_clients()          spawn_retry(edge)
//!  ┌──────────────────┐         ┌───────────────────────────────┐
//!  │ A idle+mapped    │         │ loop while session open:      │
//!  │ B idle+mapped    │──edge──▶│   retry_step() under lock     │
//!  │ A.target = B     │         │   Stale      -> exit          │
//!  │ B.target = A     │         │   Pending(t) -> send, sleep   │
//!  └──────────────────┘         └───────────────────────────────┘
//! ```
//!
//! A pairing decision made later simply overwrites the targets; the old
//! edge notices on its next step and stops. Receivers de-duplicate.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::client::Client;
use super::{Session, SessionState};
use crate::protocol::ConnectRequest;
use crate::server::ServerStats;
use crate::transport::{Transmit, UdpTransport};

/// An active connection attempt between two clients of one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PairingEdge {
    /// Client that initiated the scan.
    pub first: u8,
    /// Client it was matched with.
    pub second: u8,
}

/// Outcome of one retry iteration.
#[derive(Debug, PartialEq, Eq)]
pub enum EdgeStep {
    /// At least one side still waits for an acknowledgement.
    Pending(Vec<Transmit>),
    /// Neither side targets the other any more, or both acknowledged.
    Stale,
}

impl SessionState {
    /// Pairs every idle, mapped client with the lowest-index eligible peer.
    ///
    /// A peer is eligible when it is idle, mapped, and neither side has
    /// already reported connecting to the other.
    pub fn pair_idle_clients(&mut self) -> Vec<PairingEdge> {
        let indices: Vec<u8> = self.clients.keys().copied().collect();
        let mut edges = Vec::new();

        for &first in &indices {
            if !self.clients.get(&first).is_some_and(Client::is_available) {
                continue;
            }

            let Some(second) = indices
                .iter()
                .copied()
                .find(|&candidate| self.can_pair(first, candidate))
            else {
                continue;
            };

            tracing::info!(
                "[{:08x}] Exchange connect requests between {} and {}",
                self.cookie, first, second
            );
            if let Some(client) = self.clients.get_mut(&first) {
                client.begin_connecting(second);
            }
            if let Some(client) = self.clients.get_mut(&second) {
                client.begin_connecting(first);
            }
            edges.push(PairingEdge { first, second });
        }

        edges
    }

    fn can_pair(&self, first: u8, second: u8) -> bool {
        if first == second {
            return false;
        }
        let (Some(a), Some(b)) = (self.clients.get(&first), self.clients.get(&second)) else {
            return false;
        };
        b.is_available() && !b.has_connected_to(first) && !a.has_connected_to(second)
    }

    /// Decides what one retry iteration of `edge` must send.
    #[must_use]
    pub fn retry_step(&self, edge: PairingEdge) -> EdgeStep {
        let (Some(a), Some(b)) = (self.clients.get(&edge.first), self.clients.get(&edge.second))
        else {
            return EdgeStep::Stale;
        };

        let mut needed = false;
        let mut transmits = Vec::with_capacity(2);

        if !b.connect_ack && b.connecting_index == a.index {
            needed = true;
            transmits.extend(self.connect_request(a, b));
        }
        if !a.connect_ack && a.connecting_index == b.index {
            needed = true;
            transmits.extend(self.connect_request(b, a));
        }

        if needed {
            EdgeStep::Pending(transmits)
        } else {
            EdgeStep::Stale
        }
    }

    /// Connect-Request telling `to` to dial `from`'s game address.
    ///
    /// Always addressed to the receiver's negotiate address: the game
    /// address may not accept signalling from the server.
    fn connect_request(&self, from: &Client, to: &Client) -> Option<Transmit> {
        let destination = to.negotiate_addr?;
        let request = match ConnectRequest::for_peer(from.server_addr?) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("[{:08x}] Client {}: {}", self.cookie, from.index, e);
                return None;
            }
        };
        Some(Transmit::new(destination, request.encode(self.version, self.cookie)))
    }
}

/// Spawns the retry task for one edge.
///
/// The task ends when the session closes or the edge goes stale.
pub fn spawn_retry(
    session: Arc<Session>,
    edge: PairingEdge,
    transport: Arc<UdpTransport>,
    stats: Arc<ServerStats>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if !session.is_open() {
                return;
            }

            let step = session.lock().retry_step(edge);
            let EdgeStep::Pending(transmits) = step else {
                tracing::debug!(
                    "[{:08x}] Edge {}-{} settled",
                    session.cookie(),
                    edge.first,
                    edge.second
                );
                return;
            };

            for transmit in &transmits {
                match transport.send(transmit).await {
                    Ok(_) => stats.record_connect_request(),
                    Err(e) => tracing::warn!(
                        "[{:08x}] Connect request to {} failed: {}",
                        session.cookie(),
                        transmit.destination,
                        e
                    ),
                }
            }

            tokio::time::sleep(interval).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn mapped(index: u8) -> Client {
        let mut client = Client::new(1, index, "mkwii");
        client.negotiate_addr = Some(format!("198.51.100.{index}:50001").parse().unwrap());
        client.server_addr = Some(format!("198.51.100.{index}:50000").parse().unwrap());
        client
    }

    fn state_with(clients: impl IntoIterator<Item = Client>) -> SessionState {
        let mut state = SessionState::new(1, 3);
        for client in clients {
            state.clients.insert(client.index, client);
        }
        state
    }

    #[test]
    fn test_pairs_lowest_indices_first() {
        let mut state = state_with([mapped(5), mapped(2), mapped(9), mapped(7)]);

        let edges = state.pair_idle_clients();
        assert_eq!(
            edges,
            vec![
                PairingEdge { first: 2, second: 5 },
                PairingEdge { first: 7, second: 9 },
            ]
        );
        assert_eq!(state.client(2).unwrap().connecting_index, 5);
        assert_eq!(state.client(9).unwrap().connecting_index, 7);
    }

    #[test]
    fn test_unmapped_and_busy_clients_are_skipped() {
        let mut unmapped = Client::new(1, 1, "mkwii");
        unmapped.server_addr = Some("198.51.100.1:50000".parse().unwrap());
        let mut busy = mapped(2);
        busy.begin_connecting(8);

        let mut state = state_with([unmapped, busy, mapped(3)]);
        assert!(state.pair_idle_clients().is_empty());
    }

    #[test]
    fn test_connected_peers_are_not_paired_again() {
        let mut a = mapped(1);
        a.connected.insert(2);
        let mut state = state_with([a, mapped(2)]);
        assert!(state.pair_idle_clients().is_empty());

        // Either direction blocks the pair
        let mut b = mapped(2);
        b.connected.insert(1);
        let mut state = state_with([mapped(1), b]);
        assert!(state.pair_idle_clients().is_empty());
    }

    #[test]
    fn test_pairing_clears_acks() {
        let mut a = mapped(1);
        a.connect_ack = true;
        let mut state = state_with([a, mapped(2)]);

        state.pair_idle_clients();
        assert!(!state.client(1).unwrap().connect_ack);
    }

    #[test]
    fn test_retry_step_targets_negotiate_addresses() {
        let mut state = state_with([mapped(1), mapped(2)]);
        let edge = state.pair_idle_clients()[0];

        let EdgeStep::Pending(transmits) = state.retry_step(edge) else {
            panic!("fresh edge must be pending");
        };
        assert_eq!(transmits.len(), 2);

        let to_two = &transmits[0];
        assert_eq!(to_two.destination, "198.51.100.2:50001".parse::<SocketAddr>().unwrap());
        let request = ConnectRequest::decode(&to_two.contents[12..]).unwrap();
        assert_eq!(request.peer_addr, "198.51.100.1:50000".parse().unwrap());

        let to_one = &transmits[1];
        assert_eq!(to_one.destination, "198.51.100.1:50001".parse::<SocketAddr>().unwrap());
        let request = ConnectRequest::decode(&to_one.contents[12..]).unwrap();
        assert_eq!(request.peer_addr, "198.51.100.2:50000".parse().unwrap());
    }

    #[test]
    fn test_retry_step_stops_after_both_acks() {
        let mut state = state_with([mapped(1), mapped(2)]);
        let edge = state.pair_idle_clients()[0];

        state.clients.get_mut(&2).unwrap().connect_ack = true;
        match state.retry_step(edge) {
            EdgeStep::Pending(transmits) => {
                assert_eq!(transmits.len(), 1);
                assert_eq!(transmits[0].destination, "198.51.100.1:50001".parse::<SocketAddr>().unwrap());
            }
            EdgeStep::Stale => panic!("client 1 has not acknowledged yet"),
        }

        state.clients.get_mut(&1).unwrap().connect_ack = true;
        assert_eq!(state.retry_step(edge), EdgeStep::Stale);
    }

    #[test]
    fn test_superseded_edge_goes_stale() {
        let mut state = state_with([mapped(1), mapped(2), mapped(3)]);
        let edge = state.pair_idle_clients()[0];
        assert_eq!(edge, PairingEdge { first: 1, second: 2 });

        // Both sides report and get re-paired elsewhere
        state.rotate(1);
        state.rotate(2);
        let edges = state.pair_idle_clients();
        assert_eq!(edges, vec![PairingEdge { first: 1, second: 3 }]);

        assert_eq!(state.retry_step(edge), EdgeStep::Stale);
    }

    #[test]
    fn test_three_client_rotation() {
        let mut state = state_with([mapped(1), mapped(2), mapped(3)]);
        assert_eq!(state.pair_idle_clients(), vec![PairingEdge { first: 1, second: 2 }]);

        // 1 reports first: 3 is idle and has not met 1
        state.rotate(1);
        assert_eq!(state.pair_idle_clients(), vec![PairingEdge { first: 1, second: 3 }]);

        // 2 reports: every idle peer is busy or already connected
        state.rotate(2);
        assert!(state.pair_idle_clients().is_empty());

        // 1 and 3 finish; 2 and 3 are the only pair left
        state.rotate(1);
        state.rotate(3);
        assert_eq!(state.pair_idle_clients(), vec![PairingEdge { first: 2, second: 3 }]);

        state.rotate(2);
        state.rotate(3);
        assert!(state.pair_idle_clients().is_empty());
    }
}

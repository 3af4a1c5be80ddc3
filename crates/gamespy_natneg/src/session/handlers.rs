//! # Command Handlers
//!
//! State transitions for the commands that touch a session. Every handler
//! runs under the session lock, pushes the datagrams it wants sent into an
//! outbox and returns the pairing edges that need a retry task.

use std::net::SocketAddr;

use super::client::Client;
use super::pairing::PairingEdge;
use super::SessionState;
use crate::error::{NatNegError, NatNegResult};
use crate::protocol::{
    Command, ConnectReply, InitReply, InitRequest, MappingScheme, NatType, PacketHeader,
    ReportReply, ReportRequest,
};
use crate::transport::Transmit;

impl SessionState {
    /// Routes one packet to its handler.
    pub fn dispatch(
        &mut self,
        header: &PacketHeader,
        payload: &[u8],
        source: SocketAddr,
        outbox: &mut Vec<Transmit>,
    ) -> NatNegResult<Vec<PairingEdge>> {
        let Some(command) = header.command() else {
            tracing::warn!(
                "[{:08x}/{}] Received unknown command type: 0x{:02x}",
                self.cookie, source, header.command
            );
            return Ok(Vec::new());
        };

        match command {
            Command::InitRequest => {
                let request = InitRequest::decode(payload)?;
                self.handle_init(&request, source, outbox)
            }
            Command::ConnectReply => {
                let reply = ConnectReply::decode(payload)?;
                self.handle_connect_reply(&reply);
                Ok(Vec::new())
            }
            Command::ReportRequest => {
                let request = ReportRequest::decode(payload)?;
                Ok(self.handle_report(&request, source, outbox))
            }
            other if other.is_server_originated() => {
                tracing::warn!(
                    "[{:08x}/{}] Received server command: {}",
                    self.cookie, source, other.name()
                );
                Ok(Vec::new())
            }
            other => {
                tracing::debug!("[{:08x}/{}] Command: {}", self.cookie, source, other.name());
                Ok(Vec::new())
            }
        }
    }

    /// Init: acknowledge, register the client, learn addresses, pair.
    ///
    /// The acknowledgement is queued before registration, so a client refused
    /// for a game name conflict still receives it. Only a new index is
    /// checked against the session's game name; a registered client keeps
    /// learning addresses whatever name its later probes carry.
    pub fn handle_init(
        &mut self,
        request: &InitRequest,
        source: SocketAddr,
        outbox: &mut Vec<Transmit>,
    ) -> NatNegResult<Vec<PairingEdge>> {
        if request.stray_bytes > 0 {
            tracing::warn!(
                "[{:08x}/{}] Stray {} bytes after packet",
                self.cookie, source, request.stray_bytes
            );
        }

        outbox.push(Transmit::new(
            source,
            InitReply::for_request(request).encode(self.version, self.cookie),
        ));

        if !self.clients.contains_key(&request.client_index) {
            self.check_game_name(&request.game_name)?;
        }

        let cookie = self.cookie;
        let client = self.clients.entry(request.client_index).or_insert_with(|| {
            tracing::info!(
                "[{:08x}/{}] Creating client index {}",
                cookie, source, request.client_index
            );
            Client::new(cookie, request.client_index, request.game_name.clone())
        });
        client.learn_addresses(request, source);

        if self.game_name.is_none() {
            self.game_name = Some(request.game_name.clone());
        }

        let mapped = self
            .clients
            .get(&request.client_index)
            .is_some_and(Client::is_mapped);
        if !mapped {
            return Ok(Vec::new());
        }

        Ok(self.pair_idle_clients())
    }

    fn check_game_name(&self, game_name: &str) -> NatNegResult<()> {
        match &self.game_name {
            Some(established) if established != game_name => Err(NatNegError::GameNameMismatch {
                established: established.clone(),
                received: game_name.to_owned(),
            }),
            _ => Ok(()),
        }
    }

    /// Connect-Reply: the named client acknowledged its connect request.
    ///
    /// Returns false for an unknown index, which is otherwise ignored.
    pub fn handle_connect_reply(&mut self, reply: &ConnectReply) -> bool {
        match self.clients.get_mut(&reply.client_index) {
            Some(client) => {
                client.connect_ack = true;
                true
            }
            None => false,
        }
    }

    /// Report: acknowledge, then rotate the reporting client and re-pair.
    pub fn handle_report(
        &mut self,
        request: &ReportRequest,
        source: SocketAddr,
        outbox: &mut Vec<Transmit>,
    ) -> Vec<PairingEdge> {
        outbox.push(Transmit::new(
            source,
            ReportReply::for_request(self.version, self.cookie, request),
        ));

        tracing::info!(
            "[{:08x}/{}] Report from {} result: {} nat: {:?} mapping: {:?} game: {:?}",
            self.cookie,
            source,
            request.client_index,
            request.result,
            NatType::from_u8(request.nat_type).ok_or(request.nat_type),
            MappingScheme::from_u8(request.mapping_scheme).ok_or(request.mapping_scheme),
            request.game_name.as_deref().unwrap_or(""),
        );

        self.rotate(request.client_index);
        self.pair_idle_clients()
    }

    /// Records the reporting client's current target as connected and
    /// returns it to idle. Unknown indices are ignored.
    pub fn rotate(&mut self, index: u8) -> Option<u8> {
        self.clients.get_mut(&index).and_then(Client::finish_attempt)
    }

    /// Forced Report-Replies for every client still mid-negotiation.
    #[must_use]
    pub fn cancellations(&self) -> Vec<Transmit> {
        self.clients
            .values()
            .filter(|client| !client.is_idle())
            .filter_map(|client| {
                let destination = client.signalling_addr()?;
                tracing::info!(
                    "[{:08x}/{}] Disconnecting client {}",
                    self.cookie, destination, client.index
                );
                Some(Transmit::new(
                    destination,
                    ReportReply::cancellation(self.version, self.cookie, client.index),
                ))
            })
            .collect()
    }
}

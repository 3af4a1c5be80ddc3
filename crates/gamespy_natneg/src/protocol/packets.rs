//! # Packet Definitions
//!
//! Every NATNEG packet starts with the same 12-byte header. Payload layouts
//! below use offsets relative to the end of the header.

use std::fmt;
use std::net::{SocketAddr, SocketAddrV4};

use bytemuck::{Pod, Zeroable};
use gamespy_common::{ipv4_parts, socket_addr_v4};

use super::serialization::{PacketReader, PacketWriter};
use crate::error::{NatNegError, NatNegResult};

/// Magic prefix of every NATNEG packet.
pub const PACKET_MAGIC: [u8; 6] = [0xfd, 0xfc, 0x1e, 0x66, 0x6a, 0xb2];

/// Fixed bytes closing an Init-Reply.
pub const INIT_REPLY_TRAILER: [u8; 7] = [0xff, 0xff, 0x6d, 0x16, 0xb5, 0x7d, 0xea];

/// "got your data" flag carried by a Connect-Request.
pub const CONNECT_GOT_YOUR_DATA: u8 = 0x42;

/// "finished" flag carried by a Connect-Request.
pub const CONNECT_FINISHED: u8 = 0x00;

/// Number of Report-Request bytes echoed back in the Report-Reply.
pub const REPORT_ECHO_LEN: usize = 9;

/// Offset of the result byte inside the echoed report prefix.
const REPORT_RESULT_OFFSET: usize = 2;

/// Smallest valid Init-Request payload: 9 fixed bytes plus an empty string.
const INIT_REQUEST_MIN: usize = 10;

/// Offset of the game name inside a Report-Request payload.
const REPORT_GAME_NAME_OFFSET: usize = 11;

/// Packet header - present in every packet.
///
/// ```text
/// fd fc 1e 66 6a b2 | version | command | cookie (u32, big-endian)
/// ```
///
/// Total size: 12 bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct PacketHeader {
    /// Magic prefix, always [`PACKET_MAGIC`].
    pub magic: [u8; 6],
    /// Protocol version, fixed per session.
    pub version: u8,
    /// Raw command code.
    pub command: u8,
    /// Session cookie, big-endian.
    pub cookie: [u8; 4],
}

impl PacketHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 12;

    /// Creates a header for an outgoing packet.
    #[inline]
    #[must_use]
    pub const fn new(version: u8, command: Command, cookie: u32) -> Self {
        Self {
            magic: PACKET_MAGIC,
            version,
            command: command as u8,
            cookie: cookie.to_be_bytes(),
        }
    }

    /// Returns the session cookie.
    #[inline]
    #[must_use]
    pub const fn cookie(&self) -> u32 {
        u32::from_be_bytes(self.cookie)
    }

    /// Returns the decoded command, if the code is known.
    #[inline]
    #[must_use]
    pub const fn command(&self) -> Option<Command> {
        Command::from_u8(self.command)
    }

    /// Splits a datagram into its header and payload.
    ///
    /// Rejects datagrams shorter than the header and datagrams whose magic
    /// prefix does not match.
    pub fn decode(datagram: &[u8]) -> NatNegResult<(Self, &[u8])> {
        let mut reader = PacketReader::new(datagram);
        let header: Self = reader.read_pod()?;
        if header.magic != PACKET_MAGIC {
            return Err(NatNegError::BadMagic);
        }
        Ok((header, reader.rest()))
    }
}

/// NATNEG command codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Client -> Server: address learning probe.
    InitRequest = 0x00,
    /// Server -> Client: Init acknowledgement.
    InitReply = 0x01,
    /// Server -> Client: reachability test.
    ErtTestRequest = 0x02,
    /// Client -> Server: reachability test answer.
    ErtTestReply = 0x03,
    /// Client -> Server: state update.
    StateUpdate = 0x04,
    /// Server -> Client: connect to this peer.
    ConnectRequest = 0x05,
    /// Client -> Server: connect request received.
    ConnectReply = 0x06,
    /// Client -> Client: connection ping.
    ConnectPing = 0x07,
    /// Client -> Server: backup test.
    BackupTestRequest = 0x08,
    /// Server -> Client: backup test answer.
    BackupTestReply = 0x09,
    /// Client -> Server: stateless address check probe.
    AddressCheckRequest = 0x0A,
    /// Server -> Client: address check answer.
    AddressCheckReply = 0x0B,
    /// Client -> Server: stateless natify probe.
    NatifyRequest = 0x0C,
    /// Client -> Server: connection attempt result.
    ReportRequest = 0x0D,
    /// Server -> Client: report acknowledgement (also used to cancel).
    ReportReply = 0x0E,
    /// Client -> Server: pre-init.
    PreInitRequest = 0x0F,
    /// Server -> Client: pre-init answer.
    PreInitReply = 0x10,
}

impl Command {
    /// Decodes a command code.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Self::InitRequest,
            0x01 => Self::InitReply,
            0x02 => Self::ErtTestRequest,
            0x03 => Self::ErtTestReply,
            0x04 => Self::StateUpdate,
            0x05 => Self::ConnectRequest,
            0x06 => Self::ConnectReply,
            0x07 => Self::ConnectPing,
            0x08 => Self::BackupTestRequest,
            0x09 => Self::BackupTestReply,
            0x0A => Self::AddressCheckRequest,
            0x0B => Self::AddressCheckReply,
            0x0C => Self::NatifyRequest,
            0x0D => Self::ReportRequest,
            0x0E => Self::ReportReply,
            0x0F => Self::PreInitRequest,
            0x10 => Self::PreInitReply,
            _ => return None,
        })
    }

    /// Probes that are answered without any session context.
    #[inline]
    #[must_use]
    pub const fn is_stateless(self) -> bool {
        matches!(self, Self::AddressCheckRequest | Self::NatifyRequest)
    }

    /// Commands only the server is supposed to send.
    #[inline]
    #[must_use]
    pub const fn is_server_originated(self) -> bool {
        matches!(
            self,
            Self::InitReply
                | Self::ErtTestRequest
                | Self::ConnectRequest
                | Self::BackupTestReply
                | Self::AddressCheckReply
                | Self::ReportReply
                | Self::PreInitReply
        )
    }

    /// Protocol name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::InitRequest => "NN_INIT",
            Self::InitReply => "NN_INITACK",
            Self::ErtTestRequest => "NN_ERTTEST",
            Self::ErtTestReply => "NN_ERTACK",
            Self::StateUpdate => "NN_STATEUPDATE",
            Self::ConnectRequest => "NN_CONNECT",
            Self::ConnectReply => "NN_CONNECT_ACK",
            Self::ConnectPing => "NN_CONNECT_PING",
            Self::BackupTestRequest => "NN_BACKUP_TEST",
            Self::BackupTestReply => "NN_BACKUP_ACK",
            Self::AddressCheckRequest => "NN_ADDRESS_CHECK",
            Self::AddressCheckReply => "NN_ADDRESS_REPLY",
            Self::NatifyRequest => "NN_NATIFY_REQUEST",
            Self::ReportRequest => "NN_REPORT",
            Self::ReportReply => "NN_REPORT_ACK",
            Self::PreInitRequest => "NN_PREINIT",
            Self::PreInitReply => "NN_PREINIT_ACK",
        }
    }
}

/// Which socket an Init probe was sent from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PortType {
    /// The game's own socket.
    GamePort = 0x00,
    /// First NATNEG probe socket.
    NatNeg1 = 0x01,
    /// Second NATNEG probe socket.
    NatNeg2 = 0x02,
    /// Third NATNEG probe socket.
    NatNeg3 = 0x03,
}

impl PortType {
    /// Decodes a port type byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::GamePort),
            0x01 => Some(Self::NatNeg1),
            0x02 => Some(Self::NatNeg2),
            0x03 => Some(Self::NatNeg3),
            _ => None,
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::GamePort => "GamePort",
            Self::NatNeg1 => "NATNEG1",
            Self::NatNeg2 => "NATNEG2",
            Self::NatNeg3 => "NATNEG3",
        })
    }
}

/// NAT type a client reports after its connection attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum NatType {
    /// Public address.
    NoNat = 0x00,
    /// Firewall without translation.
    FirewallOnly = 0x01,
    /// Full cone NAT.
    FullCone = 0x02,
    /// Restricted cone NAT.
    RestrictedCone = 0x03,
    /// Port restricted cone NAT.
    PortRestrictedCone = 0x04,
    /// Symmetric NAT.
    Symmetric = 0x05,
    /// Client could not tell.
    Unknown = 0x06,
}

impl NatType {
    /// Decodes a NAT type byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::NoNat),
            0x01 => Some(Self::FirewallOnly),
            0x02 => Some(Self::FullCone),
            0x03 => Some(Self::RestrictedCone),
            0x04 => Some(Self::PortRestrictedCone),
            0x05 => Some(Self::Symmetric),
            0x06 => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// NAT port mapping behaviour a client reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MappingScheme {
    /// Client could not tell.
    Unknown = 0x00,
    /// Private and public ports match.
    SamePrivatePublic = 0x01,
    /// Same public port for every destination.
    Consistent = 0x02,
    /// Public port increments per destination.
    Incremental = 0x03,
    /// No recognisable pattern.
    Mixed = 0x04,
}

impl MappingScheme {
    /// Decodes a mapping scheme byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Unknown),
            0x01 => Some(Self::SamePrivatePublic),
            0x02 => Some(Self::Consistent),
            0x03 => Some(Self::Incremental),
            0x04 => Some(Self::Mixed),
            _ => None,
        }
    }
}

/// Init-Request payload.
///
/// ```text
/// portType(1) clientIndex(1) useGamePort(1) localIP(4) localPort(2, BE) gameName\0
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitRequest {
    /// Socket the probe was sent from.
    pub port_type: PortType,
    /// Peer-chosen index inside the session.
    pub client_index: u8,
    /// Whether the game port carries the real connection.
    pub use_game_port: bool,
    /// Self-reported LAN address.
    pub local_addr: SocketAddrV4,
    /// Game identifier.
    pub game_name: String,
    /// Bytes found after the game name terminator.
    pub stray_bytes: usize,
}

impl InitRequest {
    /// Decodes and validates an Init-Request payload.
    pub fn decode(payload: &[u8]) -> NatNegResult<Self> {
        if payload.len() < INIT_REQUEST_MIN {
            return Err(NatNegError::PacketTooShort {
                needed: INIT_REQUEST_MIN,
                actual: payload.len(),
            });
        }

        let mut reader = PacketReader::new(payload);
        let port_type = reader.read_u8()?;
        let client_index = reader.read_u8()?;
        let use_game_port = reader.read_u8()?;
        let local_ip = reader.read_array::<4>()?;
        let local_port = reader.read_u16()?;
        let game_name = reader.read_cstring()?;

        let port_type = PortType::from_u8(port_type).ok_or(NatNegError::InvalidPortType(port_type))?;
        let use_game_port = match use_game_port {
            0 => false,
            1 => true,
            other => return Err(NatNegError::InvalidUseGamePort(other)),
        };
        if !use_game_port && port_type == PortType::GamePort {
            return Err(NatNegError::GamePortDisabled);
        }

        Ok(Self {
            port_type,
            client_index,
            use_game_port,
            local_addr: socket_addr_v4(local_ip, local_port),
            game_name,
            stray_bytes: reader.remaining(),
        })
    }

    /// Encodes a full Init-Request datagram.
    #[must_use]
    pub fn encode(&self, version: u8, cookie: u32) -> Vec<u8> {
        let mut writer = PacketWriter::new();
        writer
            .write_pod(&PacketHeader::new(version, Command::InitRequest, cookie))
            .write_u8(self.port_type as u8)
            .write_u8(self.client_index)
            .write_u8(u8::from(self.use_game_port))
            .write_bytes(&self.local_addr.ip().octets())
            .write_u16(self.local_addr.port())
            .write_bytes(self.game_name.as_bytes())
            .write_u8(0);
        writer.finish()
    }
}

/// Init-Reply: echoes port type and client index.
///
/// ```text
/// portType(1) clientIndex(1) ff ff 6d 16 b5 7d ea
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InitReply {
    /// Echoed port type.
    pub port_type: PortType,
    /// Echoed client index.
    pub client_index: u8,
}

impl InitReply {
    /// Builds the reply for a request.
    #[must_use]
    pub const fn for_request(request: &InitRequest) -> Self {
        Self {
            port_type: request.port_type,
            client_index: request.client_index,
        }
    }

    /// Encodes the full datagram.
    #[must_use]
    pub fn encode(&self, version: u8, cookie: u32) -> Vec<u8> {
        let mut writer = PacketWriter::new();
        writer
            .write_pod(&PacketHeader::new(version, Command::InitReply, cookie))
            .write_u8(self.port_type as u8)
            .write_u8(self.client_index)
            .write_bytes(&INIT_REPLY_TRAILER);
        writer.finish()
    }
}

/// Connect-Request: tells a client which address to dial.
///
/// ```text
/// serverIP(4) port(2, BE) gotYourData(1) finished(1)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Game address of the peer to connect to.
    pub peer_addr: SocketAddrV4,
}

impl ConnectRequest {
    /// Payload size.
    pub const PAYLOAD_SIZE: usize = 8;

    /// Points the receiver at `peer`, which must have an IPv4 form.
    pub fn for_peer(peer: SocketAddr) -> NatNegResult<Self> {
        let (ip, port) = ipv4_parts(&peer).ok_or(NatNegError::UnsupportedAddress(peer))?;
        Ok(Self {
            peer_addr: socket_addr_v4(ip, port),
        })
    }

    /// Encodes the full datagram.
    #[must_use]
    pub fn encode(&self, version: u8, cookie: u32) -> Vec<u8> {
        let mut writer = PacketWriter::new();
        writer
            .write_pod(&PacketHeader::new(version, Command::ConnectRequest, cookie))
            .write_bytes(&self.peer_addr.ip().octets())
            .write_u16(self.peer_addr.port())
            .write_u8(CONNECT_GOT_YOUR_DATA)
            .write_u8(CONNECT_FINISHED);
        writer.finish()
    }

    /// Decodes a Connect-Request payload.
    pub fn decode(payload: &[u8]) -> NatNegResult<Self> {
        let mut reader = PacketReader::new(payload);
        let ip = reader.read_array::<4>()?;
        let port = reader.read_u16()?;
        reader.skip(2)?;
        Ok(Self {
            peer_addr: socket_addr_v4(ip, port),
        })
    }
}

/// Connect-Reply: a client acknowledging a Connect-Request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectReply {
    /// Raw port type byte (not interpreted).
    pub port_type: u8,
    /// Index of the acknowledging client.
    pub client_index: u8,
}

impl ConnectReply {
    /// Decodes a Connect-Reply payload.
    pub fn decode(payload: &[u8]) -> NatNegResult<Self> {
        let mut reader = PacketReader::new(payload);
        Ok(Self {
            port_type: reader.read_u8()?,
            client_index: reader.read_u8()?,
        })
    }
}

/// Report-Request: outcome of a client's connection attempt.
///
/// ```text
/// portType(1) clientIndex(1) result(1) natType(1) ...(3) mappingScheme(1) ...(3) gameName\0
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportRequest {
    /// First bytes of the payload, echoed in the reply.
    pub echo: [u8; REPORT_ECHO_LEN],
    /// Index of the reporting client.
    pub client_index: u8,
    /// Raw result byte.
    pub result: u8,
    /// Raw NAT type byte.
    pub nat_type: u8,
    /// Raw mapping scheme byte.
    pub mapping_scheme: u8,
    /// Game name, when present and well formed.
    pub game_name: Option<String>,
}

impl ReportRequest {
    /// Decodes a Report-Request payload.
    ///
    /// Only the echoed prefix is mandatory; the game name is informational.
    pub fn decode(payload: &[u8]) -> NatNegResult<Self> {
        let echo = PacketReader::new(payload).read_array::<REPORT_ECHO_LEN>()?;
        let game_name = payload
            .get(REPORT_GAME_NAME_OFFSET..)
            .and_then(|rest| PacketReader::new(rest).read_cstring().ok());

        Ok(Self {
            echo,
            client_index: echo[1],
            result: echo[2],
            nat_type: echo[3],
            mapping_scheme: echo[7],
            game_name,
        })
    }
}

/// Report-Reply builders.
pub struct ReportReply;

impl ReportReply {
    /// Acknowledges a report: header plus the echoed prefix with the result
    /// byte forced to zero.
    #[must_use]
    pub fn for_request(version: u8, cookie: u32, request: &ReportRequest) -> Vec<u8> {
        let mut echo = request.echo;
        echo[REPORT_RESULT_OFFSET] = 0;

        let mut writer = PacketWriter::new();
        writer
            .write_pod(&PacketHeader::new(version, Command::ReportReply, cookie))
            .write_bytes(&echo);
        writer.finish()
    }

    /// Forced reply sent to a mid-negotiation client when its session
    /// expires, making it abandon the attempt.
    #[must_use]
    pub fn cancellation(version: u8, cookie: u32, client_index: u8) -> Vec<u8> {
        let mut writer = PacketWriter::new();
        writer
            .write_pod(&PacketHeader::new(version, Command::ReportReply, cookie))
            .write_bytes(&[0x00, client_index, 0x00])
            .write_bytes(&[0x00, 0x00, 0x00, 0x06, 0x00, 0x00]);
        writer.finish()
    }
}

//! # NATNEG Error Types
//!
//! Every failure is local to one packet. Nothing here tears down a session
//! or the listening socket; the listener logs the error and moves on.

use std::net::SocketAddr;

use gamespy_common::StringError;
use thiserror::Error;

/// Errors that can occur while handling NATNEG traffic.
#[derive(Error, Debug)]
pub enum NatNegError {
    /// Datagram or payload shorter than its fixed layout.
    #[error("packet too short: need {needed} bytes, got {actual}")]
    PacketTooShort {
        /// Bytes required by the layout.
        needed: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// The 6-byte magic prefix did not match.
    #[error("invalid packet magic")]
    BadMagic,

    /// A string field could not be decoded.
    #[error("invalid string field: {0}")]
    BadString(#[from] StringError),

    /// Packet version differs from the version the session was opened with.
    #[error("version mismatch: session uses {session}, packet has {packet}")]
    VersionMismatch {
        /// Version fixed by the session's first packet.
        session: u8,
        /// Version carried by this packet.
        packet: u8,
    },

    /// Port type outside `GamePort..=NatNeg3`.
    #[error("invalid port type 0x{0:02x}")]
    InvalidPortType(u8),

    /// The use-game-port flag is not a boolean.
    #[error("invalid use-game-port value 0x{0:02x}")]
    InvalidUseGamePort(u8),

    /// Request arrived on the game port while claiming not to use it.
    #[error("request uses the game port but use-game-port is disabled")]
    GamePortDisabled,

    /// An Init for a new client carries a game name other than the session's.
    #[error("game name mismatch: session is {established:?}, client sent {received:?}")]
    GameNameMismatch {
        /// Game name established by the session's first client.
        established: String,
        /// Game name carried by the rejected packet.
        received: String,
    },

    /// Address has no 4-byte wire representation.
    #[error("address {0} cannot be encoded as IPv4")]
    UnsupportedAddress(SocketAddr),

    /// Socket I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Coarse classification used to pick a log level at the transport boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Short packet, bad magic, bad string.
    Malformed,
    /// Well-formed packet that breaks a protocol rule.
    ProtocolViolation,
    /// Client registration refused because of a game name conflict.
    IdentityConflict,
    /// Fault on the server side (socket, config, address encoding).
    Local,
}

impl NatNegError {
    /// Returns the taxonomy bucket of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PacketTooShort { .. } | Self::BadMagic | Self::BadString(_) => {
                ErrorKind::Malformed
            }
            Self::VersionMismatch { .. }
            | Self::InvalidPortType(_)
            | Self::InvalidUseGamePort(_)
            | Self::GamePortDisabled => ErrorKind::ProtocolViolation,
            Self::GameNameMismatch { .. } => ErrorKind::IdentityConflict,
            Self::UnsupportedAddress(_) | Self::Io(_) | Self::Config(_) => ErrorKind::Local,
        }
    }
}

/// Result type for NATNEG operations.
pub type NatNegResult<T> = Result<T, NatNegError>;

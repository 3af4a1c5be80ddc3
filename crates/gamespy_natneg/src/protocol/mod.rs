//! # Network Protocol
//!
//! NATNEG wire format.
//!
//! ## Packet Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (12 bytes)                                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Magic (6) │ Version (1) │ Command (1) │ Cookie (4, BE)       │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payload (command specific)                                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod packets;
mod serialization;

pub use packets::{
    Command, ConnectReply, ConnectRequest, InitReply, InitRequest, MappingScheme, NatType,
    PacketHeader, PortType, ReportReply, ReportRequest, CONNECT_FINISHED, CONNECT_GOT_YOUR_DATA,
    INIT_REPLY_TRAILER, PACKET_MAGIC, REPORT_ECHO_LEN,
};
pub use serialization::{PacketReader, PacketWriter, MAX_OUTGOING_SIZE};

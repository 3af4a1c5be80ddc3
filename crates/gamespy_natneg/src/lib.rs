//! # GameSpy NAT Negotiation
//!
//! UDP coordinator that helps two game clients behind NATs open a direct
//! path to each other.
//!
//! ## Architecture
//!
//! - **Protocol**: 12-byte header plus fixed command payloads
//! - **Transport**: one UDP socket, shared by every task
//! - **Sessions**: cookie-keyed, fixed 30 second lifetime
//! - **Pairing**: idle clients are matched and re-sent connect requests
//!   every 500 ms until both ends acknowledge
//!
//! ## Negotiation
//!
//! ```text
//! CLIENT A                  SERVER                  CLIENT B
//!   |--- Init (game port) --->|                        |
//!   |--- Init (natneg 1) ---->|<--- Init (both) -------|
//!   |                         | pair A <-> B           |
//!   |<-- Connect (B's addr) --|--- Connect (A's addr)->|
//!   |--- Connect Reply ------>|<--- Connect Reply -----|
//!   |--- Report ------------->|<--- Report ------------|
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use gamespy_natneg::{NatNegConfig, NatNegServer};
//!
//! # async fn serve() -> gamespy_natneg::NatNegResult<()> {
//! let server = NatNegServer::bind(NatNegConfig::default()).await?;
//! server.run().await;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use config::NatNegConfig;
pub use error::{ErrorKind, NatNegError, NatNegResult};
pub use protocol::{Command, PacketHeader, PortType};
pub use server::{NatNegServer, ServerStats, ServerStatsSnapshot};
pub use session::{Client, Session, SessionRegistry, SessionState};
pub use transport::{Transmit, TransportStats, UdpTransport};

use std::time::Duration;

/// Session lifetime, counted from creation.
pub const SESSION_TTL: Duration = Duration::from_secs(30);

/// Delay between connect request retries on one edge.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Default receive buffer size.
///
/// Every NATNEG packet fits well inside this; anything longer is truncated
/// by the socket and its trailing bytes are ignored.
pub const MAX_DATAGRAM_SIZE: usize = 1024;

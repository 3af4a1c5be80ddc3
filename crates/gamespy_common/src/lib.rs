//! # GameSpy Common
//!
//! Encoding conventions shared by every GameSpy service.
//!
//! ## Contents
//!
//! - [`addr`]: IPv4 octet/port conversion
//! - [`string`]: null-terminated string fields inside binary packets
//! - [`constants`]: well-known service ports
//!
//! Nothing here owns a socket or any state. Service crates (NATNEG, GPCM)
//! depend on this crate and never on each other.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod addr;
pub mod constants;
pub mod string;

pub use addr::{ipv4_parts, socket_addr_v4};
pub use constants::NATNEG_PORT;
pub use string::{read_cstring, StringError};

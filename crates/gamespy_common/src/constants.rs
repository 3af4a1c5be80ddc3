//! # Service Constants
//!
//! Ports the legacy clients have baked in.

/// UDP port of the NAT negotiation service.
pub const NATNEG_PORT: u16 = 27901;

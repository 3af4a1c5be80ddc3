//! # Address Encoding
//!
//! GameSpy packets carry IPv4 addresses as 4 raw octets followed by a
//! big-endian port. Only IPv4 is representable.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Splits a socket address into wire octets and port.
///
/// IPv4-mapped IPv6 addresses are unwrapped. Any other IPv6 address has no
/// wire representation and yields `None`.
#[must_use]
pub fn ipv4_parts(addr: &SocketAddr) -> Option<([u8; 4], u16)> {
    match addr {
        SocketAddr::V4(v4) => Some((v4.ip().octets(), v4.port())),
        SocketAddr::V6(v6) => v6
            .ip()
            .to_ipv4_mapped()
            .map(|ip| (ip.octets(), v6.port())),
    }
}

/// Builds a socket address from wire octets and port.
#[inline]
#[must_use]
pub fn socket_addr_v4(octets: [u8; 4], port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::from(octets), port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_parts() {
        let addr: SocketAddr = "10.0.0.7:3000".parse().unwrap();
        assert_eq!(ipv4_parts(&addr), Some(([10, 0, 0, 7], 3000)));
    }

    #[test]
    fn test_ipv4_mapped_v6_is_unwrapped() {
        let addr: SocketAddr = "[::ffff:10.0.0.7]:3000".parse().unwrap();
        assert_eq!(ipv4_parts(&addr), Some(([10, 0, 0, 7], 3000)));

        let native: SocketAddr = "[2001:db8::1]:3000".parse().unwrap();
        assert_eq!(ipv4_parts(&native), None);
    }

    #[test]
    fn test_socket_addr_v4() {
        let addr = socket_addr_v4([127, 0, 0, 1], 9);
        assert_eq!(addr.to_string(), "127.0.0.1:9");
    }
}

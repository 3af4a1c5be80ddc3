//! # Transport Layer
//!
//! The single UDP socket every NATNEG packet goes through.
//!
//! ## Design
//!
//! - One socket, shared by the listener, retry tasks and expiry timers
//! - Connectionless: nothing is remembered between datagrams
//! - Counters are atomics so every sharer can update them through `&self`

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::UdpSocket;

/// A datagram waiting to be sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transmit {
    /// Where to send it.
    pub destination: SocketAddr,
    /// Complete packet bytes, header included.
    pub contents: Vec<u8>,
}

impl Transmit {
    /// Creates a datagram for `destination`.
    #[inline]
    #[must_use]
    pub fn new(destination: SocketAddr, contents: Vec<u8>) -> Self {
        Self {
            destination,
            contents,
        }
    }
}

/// UDP socket wrapper with packet statistics.
#[derive(Debug)]
pub struct UdpTransport {
    /// The underlying socket.
    socket: UdpSocket,
    /// Local address.
    local_addr: SocketAddr,
    /// Statistics.
    counters: TransportCounters,
}

/// Transport statistics snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Packets sent.
    pub packets_sent: u64,
    /// Packets received.
    pub packets_received: u64,
    /// Bytes sent.
    pub bytes_sent: u64,
    /// Bytes received.
    pub bytes_received: u64,
    /// Send errors.
    pub send_errors: u64,
    /// Receive errors.
    pub recv_errors: u64,
}

#[derive(Debug, Default)]
struct TransportCounters {
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    send_errors: AtomicU64,
    recv_errors: AtomicU64,
}

impl UdpTransport {
    /// Binds the socket. Failure here is fatal for the server.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            counters: TransportCounters::default(),
        })
    }

    /// Returns the local address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sends one datagram.
    pub async fn send(&self, transmit: &Transmit) -> io::Result<usize> {
        match self
            .socket
            .send_to(&transmit.contents, transmit.destination)
            .await
        {
            Ok(n) => {
                self.counters.packets_sent.fetch_add(1, Ordering::Relaxed);
                self.counters.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            Err(e) => {
                self.counters.send_errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Receives one datagram into `buffer`.
    pub async fn recv_from(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        match self.socket.recv_from(buffer).await {
            Ok((len, addr)) => {
                self.counters.packets_received.fetch_add(1, Ordering::Relaxed);
                self.counters.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
                Ok((len, addr))
            }
            Err(e) => {
                self.counters.recv_errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Returns statistics.
    #[must_use]
    pub fn stats(&self) -> TransportStats {
        let c = &self.counters;
        TransportStats {
            packets_sent: c.packets_sent.load(Ordering::Relaxed),
            packets_received: c.packets_received.load(Ordering::Relaxed),
            bytes_sent: c.bytes_sent.load(Ordering::Relaxed),
            bytes_received: c.bytes_received.load(Ordering::Relaxed),
            send_errors: c.send_errors.load(Ordering::Relaxed),
            recv_errors: c.recv_errors.load(Ordering::Relaxed),
        }
    }
}

//! # NATNEG Flow Tests
//!
//! Drives a real server over loopback with short timers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gamespy_natneg::protocol::{
    Command, ConnectRequest, InitRequest, PacketHeader, PortType, INIT_REPLY_TRAILER,
    PACKET_MAGIC,
};
use gamespy_natneg::{NatNegConfig, NatNegServer};
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

const VERSION: u8 = 3;
const GAME: &str = "mariokartwii";
const RETRY_MS: u64 = 50;

async fn start(session_ttl_ms: u64) -> Arc<NatNegServer> {
    let config = NatNegConfig {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        session_ttl_ms,
        retry_interval_ms: RETRY_MS,
        ..NatNegConfig::default()
    };
    let server = Arc::new(NatNegServer::bind(config).await.unwrap());
    let runner = Arc::clone(&server);
    tokio::spawn(async move { runner.run().await });
    server
}

async fn socket() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

fn init(index: u8, port_type: PortType) -> InitRequest {
    InitRequest {
        port_type,
        client_index: index,
        use_game_port: true,
        local_addr: "192.168.1.20:3074".parse().unwrap(),
        game_name: GAME.into(),
        stray_bytes: 0,
    }
}

fn datagram(version: u8, command: u8, cookie: u32, payload: &[u8]) -> Vec<u8> {
    let mut bytes = PACKET_MAGIC.to_vec();
    bytes.extend_from_slice(&[version, command]);
    bytes.extend_from_slice(&cookie.to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

fn report(index: u8) -> Vec<u8> {
    let mut payload = vec![PortType::NatNeg1 as u8, index, 1, 4, 0, 0, 0, 2, 0, 0, 0];
    payload.extend_from_slice(GAME.as_bytes());
    payload.push(0);
    payload
}

async fn recv(socket: &UdpSocket) -> (PacketHeader, Vec<u8>) {
    let mut buffer = [0u8; 256];
    let len = timeout(Duration::from_secs(2), socket.recv(&mut buffer))
        .await
        .expect("timed out waiting for the server")
        .unwrap();
    let (header, payload) = PacketHeader::decode(&buffer[..len]).unwrap();
    (header, payload.to_vec())
}

/// Receives until a packet with `command` arrives.
async fn recv_command(socket: &UdpSocket, command: Command) -> (PacketHeader, Vec<u8>) {
    loop {
        let (header, payload) = recv(socket).await;
        if header.command() == Some(command) {
            return (header, payload);
        }
    }
}

/// A client with separate game and negotiation sockets.
struct Peer {
    index: u8,
    game: UdpSocket,
    negotiate: UdpSocket,
}

impl Peer {
    async fn new(index: u8) -> Self {
        Self {
            index,
            game: socket().await,
            negotiate: socket().await,
        }
    }

    async fn map(&self, server: SocketAddr, cookie: u32) {
        let probe = init(self.index, PortType::GamePort).encode(VERSION, cookie);
        self.game.send_to(&probe, server).await.unwrap();
        recv_command(&self.game, Command::InitReply).await;

        let probe = init(self.index, PortType::NatNeg1).encode(VERSION, cookie);
        self.negotiate.send_to(&probe, server).await.unwrap();
        recv_command(&self.negotiate, Command::InitReply).await;
    }
}

#[tokio::test]
async fn test_init_is_acknowledged() {
    let server = start(30_000).await;
    let client = socket().await;

    let probe = init(4, PortType::NatNeg2).encode(VERSION, 0xCAFE_0001);
    client.send_to(&probe, server.local_addr()).await.unwrap();

    let (header, payload) = recv(&client).await;
    assert_eq!(header.command(), Some(Command::InitReply));
    assert_eq!(header.version, VERSION);
    assert_eq!(header.cookie(), 0xCAFE_0001);
    assert_eq!(payload[0], PortType::NatNeg2 as u8);
    assert_eq!(payload[1], 4);
    assert!(payload.ends_with(&INIT_REPLY_TRAILER));

    let session = server.registry().get(0xCAFE_0001).unwrap();
    assert_eq!(session.lock().len(), 1);
    assert_eq!(server.stats().sessions_created, 1);
}

#[tokio::test]
async fn test_pair_exchange_and_report() {
    let server = start(30_000).await;
    let addr = server.local_addr();
    let cookie = 0xCAFE_0002;

    let a = Peer::new(0).await;
    let b = Peer::new(1).await;
    a.map(addr, cookie).await;
    b.map(addr, cookie).await;

    // Each side is told to dial the other's game socket
    let (_, payload) = recv_command(&a.negotiate, Command::ConnectRequest).await;
    let request = ConnectRequest::decode(&payload).unwrap();
    assert_eq!(SocketAddr::V4(request.peer_addr), b.game.local_addr().unwrap());

    let (_, payload) = recv_command(&b.negotiate, Command::ConnectRequest).await;
    let request = ConnectRequest::decode(&payload).unwrap();
    assert_eq!(SocketAddr::V4(request.peer_addr), a.game.local_addr().unwrap());

    for peer in [&a, &b] {
        let ack = datagram(
            VERSION,
            Command::ConnectReply as u8,
            cookie,
            &[PortType::NatNeg1 as u8, peer.index],
        );
        peer.negotiate.send_to(&ack, addr).await.unwrap();
    }

    // Retries stop once both sides acknowledged
    tokio::time::sleep(Duration::from_millis(RETRY_MS * 4)).await;
    let sent = server.stats().connect_requests_sent;
    tokio::time::sleep(Duration::from_millis(RETRY_MS * 4)).await;
    assert_eq!(server.stats().connect_requests_sent, sent);

    let request = report(a.index);
    a.negotiate
        .send_to(&datagram(VERSION, Command::ReportRequest as u8, cookie, &request), addr)
        .await
        .unwrap();
    let (header, payload) = recv_command(&a.negotiate, Command::ReportReply).await;
    assert_eq!(header.cookie(), cookie);
    let mut expected = request[..9].to_vec();
    expected[2] = 0;
    assert_eq!(payload, expected);

    let session = server.registry().get(cookie).unwrap();
    let state = session.lock();
    assert!(state.client(a.index).unwrap().has_connected_to(b.index));
    assert!(state.client(a.index).unwrap().is_idle());
}

#[tokio::test]
async fn test_connect_request_resent_until_acknowledged() {
    let server = start(30_000).await;
    let addr = server.local_addr();
    let cookie = 0xCAFE_0007;

    let a = Peer::new(0).await;
    let b = Peer::new(1).await;
    a.map(addr, cookie).await;
    b.map(addr, cookie).await;

    // B acknowledges at once, A stays silent
    let ack = datagram(
        VERSION,
        Command::ConnectReply as u8,
        cookie,
        &[PortType::NatNeg1 as u8, b.index],
    );
    b.negotiate.send_to(&ack, addr).await.unwrap();

    let (_, first) = recv_command(&a.negotiate, Command::ConnectRequest).await;
    let started = Instant::now();
    let (_, second) = recv_command(&a.negotiate, Command::ConnectRequest).await;
    let (_, third) = recv_command(&a.negotiate, Command::ConnectRequest).await;
    assert_eq!(first, second);
    assert_eq!(second, third);
    assert!(started.elapsed() >= Duration::from_millis(RETRY_MS));

    let ack = datagram(
        VERSION,
        Command::ConnectReply as u8,
        cookie,
        &[PortType::NatNeg1 as u8, a.index],
    );
    a.negotiate.send_to(&ack, addr).await.unwrap();

    tokio::time::sleep(Duration::from_millis(RETRY_MS * 4)).await;
    let sent = server.stats().connect_requests_sent;
    tokio::time::sleep(Duration::from_millis(RETRY_MS * 4)).await;
    assert_eq!(server.stats().connect_requests_sent, sent);
}

#[tokio::test]
async fn test_expiry_cancels_pending_attempts() {
    let server = start(300).await;
    let addr = server.local_addr();
    let cookie = 0xCAFE_0003;

    let a = Peer::new(1).await;
    let b = Peer::new(2).await;
    a.map(addr, cookie).await;
    b.map(addr, cookie).await;

    for peer in [&a, &b] {
        let (header, payload) = recv_command(&peer.negotiate, Command::ReportReply).await;
        assert_eq!(header.cookie(), cookie);
        assert_eq!(payload, [0, peer.index, 0, 0, 0, 0, 6, 0, 0]);
    }

    timeout(Duration::from_secs(2), async {
        while server.stats().sessions_expired == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(server.registry().get(cookie).is_none());

    // Retry tasks stop with the session
    tokio::time::sleep(Duration::from_millis(RETRY_MS * 2)).await;
    let sent = server.stats().connect_requests_sent;
    tokio::time::sleep(Duration::from_millis(RETRY_MS * 4)).await;
    assert_eq!(server.stats().connect_requests_sent, sent);
}

#[tokio::test]
async fn test_stateless_and_unknown_commands_create_no_session() {
    let server = start(30_000).await;
    let addr = server.local_addr();
    let client = socket().await;

    for command in [Command::AddressCheckRequest as u8, Command::NatifyRequest as u8, 0x42] {
        client
            .send_to(&datagram(VERSION, command, 0xCAFE_0004, &[0; 8]), addr)
            .await
            .unwrap();
    }

    // Packets from one socket are handled in order
    let probe = init(0, PortType::NatNeg1).encode(VERSION, 0xCAFE_0005);
    client.send_to(&probe, addr).await.unwrap();
    recv_command(&client, Command::InitReply).await;

    assert!(server.registry().get(0xCAFE_0004).is_none());
    assert_eq!(server.registry().len(), 1);
}

#[tokio::test]
async fn test_bad_packets_are_dropped() {
    let server = start(30_000).await;
    let addr = server.local_addr();
    let cookie = 0xCAFE_0006;
    let client = socket().await;

    let probe = init(0, PortType::NatNeg1).encode(VERSION, cookie);
    client.send_to(&probe, addr).await.unwrap();
    recv_command(&client, Command::InitReply).await;

    // Wrong version for the session, then a broken magic
    let other = init(1, PortType::NatNeg1).encode(VERSION - 1, cookie);
    client.send_to(&other, addr).await.unwrap();
    client.send_to(b"\x00\x01\x02", addr).await.unwrap();

    let probe = init(2, PortType::NatNeg1).encode(VERSION, cookie);
    client.send_to(&probe, addr).await.unwrap();
    let (_, payload) = recv_command(&client, Command::InitReply).await;
    assert_eq!(payload[1], 2);

    let session = server.registry().get(cookie).unwrap();
    assert!(session.lock().client(1).is_none());
    assert_eq!(session.lock().len(), 2);
    assert_eq!(server.stats().packets_dropped, 2);
}

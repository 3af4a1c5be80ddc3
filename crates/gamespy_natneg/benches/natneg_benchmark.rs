//! # NATNEG Hot Path Benchmark
//!
//! Decode cost of the common packets and the cost of filling a busy
//! session, which re-runs the pairing scan on every mapped Init.
//!
//! Run with: `cargo bench --package gamespy_natneg`

#![allow(missing_docs)]

use std::net::SocketAddr;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gamespy_natneg::protocol::{InitRequest, PacketHeader, PortType};
use gamespy_natneg::SessionState;

const COOKIE: u32 = 0x1234_5678;
const VERSION: u8 = 3;

fn init(index: u8, port_type: PortType) -> InitRequest {
    InitRequest {
        port_type,
        client_index: index,
        use_game_port: true,
        local_addr: "192.168.0.2:3074".parse().unwrap(),
        game_name: "mariokartwii".into(),
        stray_bytes: 0,
    }
}

fn bench_decode(c: &mut Criterion) {
    let datagram = init(1, PortType::NatNeg1).encode(VERSION, COOKIE);

    c.bench_function("header_decode", |b| {
        b.iter(|| PacketHeader::decode(black_box(&datagram)).unwrap());
    });

    c.bench_function("init_decode", |b| {
        b.iter(|| {
            let (_, payload) = PacketHeader::decode(black_box(&datagram)).unwrap();
            InitRequest::decode(payload).unwrap()
        });
    });
}

fn bench_fill_session(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill_session");

    for clients in [2u8, 8, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(clients), &clients, |b, &clients| {
            b.iter(|| {
                let mut state = SessionState::new(COOKIE, VERSION);
                let mut outbox = Vec::new();
                let mut edges = 0;
                for index in 0..clients {
                    let game: SocketAddr = format!("198.51.100.{index}:50000").parse().unwrap();
                    let negotiate: SocketAddr = format!("198.51.100.{index}:50001").parse().unwrap();
                    state
                        .handle_init(&init(index, PortType::GamePort), game, &mut outbox)
                        .unwrap();
                    edges += state
                        .handle_init(&init(index, PortType::NatNeg1), negotiate, &mut outbox)
                        .unwrap()
                        .len();
                }
                black_box((edges, outbox.len()))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_fill_session);
criterion_main!(benches);

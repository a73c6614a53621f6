//! Fan-out benchmarks for roomcast.
//!
//! Measures post-to-delivery time for one message reaching every other
//! member of a room over in-memory connections.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use roomcast_core::{BroadcastMessage, Membership, Room, RoomCode, RoomConfig, RoomHandle};
use roomcast_transport::{MemoryConnection, MemoryPeer, Payload};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

struct Fixture {
    room: RoomHandle,
    members: Vec<Membership>,
    peers: Vec<MemoryPeer>,
}

fn fixture(rt: &Runtime, size: usize) -> Fixture {
    rt.block_on(async {
        let room = Room::spawn(RoomCode::parse("BENCH1").unwrap(), RoomConfig::default());
        let mut members = Vec::with_capacity(size);
        let mut peers = Vec::with_capacity(size);
        for i in 0..size {
            let (conn, peer) = MemoryConnection::pair(format!("bench-{i}"));
            members.push(room.attach(Box::new(conn)).unwrap());
            peers.push(peer);
        }
        Fixture { room, members, peers }
    })
}

/// One sender, `n - 1` receivers.
fn bench_fanout(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("fanout");
    group.measurement_time(Duration::from_secs(5));

    for size in [2usize, 10, 100] {
        let mut fx = fixture(&rt, size);
        let sender = fx.members[0].client().id().clone();
        let payload = Payload::from(vec![0u8; 64]);

        group.throughput(Throughput::Elements((size - 1) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter_custom(|iters| {
                rt.block_on(async {
                    let start = Instant::now();
                    for _ in 0..iters {
                        let message = BroadcastMessage::new(sender.clone(), payload.clone());
                        fx.room.post(message).await.unwrap();
                        for peer in fx.peers.iter_mut().skip(1) {
                            peer.recv().await.unwrap();
                        }
                    }
                    start.elapsed()
                })
            });
        });

        rt.block_on(async {
            fx.room.quit();
            for membership in fx.members.drain(..) {
                membership.leave().await;
            }
        });
    }

    group.finish();
}

/// Payload size at a fixed room size.
fn bench_payload_size(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("fanout_payload");
    let mut fx = fixture(&rt, 10);
    let sender = fx.members[0].client().id().clone();

    for bytes in [64usize, 1024, 65536] {
        let payload = Payload::from(vec![0u8; bytes]);
        group.throughput(Throughput::Bytes((bytes * 9) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(bytes), &bytes, |b, _| {
            b.iter_custom(|iters| {
                rt.block_on(async {
                    let start = Instant::now();
                    for _ in 0..iters {
                        let message = BroadcastMessage::new(sender.clone(), payload.clone());
                        fx.room.post(message).await.unwrap();
                        for peer in fx.peers.iter_mut().skip(1) {
                            peer.recv().await.unwrap();
                        }
                    }
                    start.elapsed()
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fanout, bench_payload_size);
criterion_main!(benches);

//! Throughput benchmarks for plexus hubs.
//!
//! These benchmarks measure how fast values move through each hub kind as
//! the number of endpoints grows.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use plexus_core::{BroadcastHub, CollectHub, HubConfig, OverflowPolicy};
use std::time::Instant;
use tokio::runtime::Runtime;

const CAPACITY: usize = 1024;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime")
}

/// Benchmark broadcast fan-out across subscriber counts.
fn bench_broadcast_fanout(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("broadcast_fanout");

    for subscribers in [1usize, 8, 64] {
        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &subscribers| {
                b.iter_custom(|iters| {
                    rt.block_on(async {
                        let hub = BroadcastHub::new(CAPACITY).unwrap();
                        let mut receivers = Vec::with_capacity(subscribers);
                        for _ in 0..subscribers {
                            receivers.push(hub.allocate().await.unwrap().into_channel());
                        }

                        let start = Instant::now();
                        for i in 0..iters {
                            hub.publish(i).await.unwrap();
                            for rx in &mut receivers {
                                black_box(rx.recv().await);
                            }
                        }
                        let elapsed = start.elapsed();

                        hub.release().await.unwrap();
                        elapsed
                    })
                });
            },
        );
    }

    group.finish();
}

/// Benchmark broadcast fan-out with the drop-newest policy.
fn bench_broadcast_drop_newest(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("broadcast_drop_newest");

    group.throughput(Throughput::Elements(8));
    group.bench_function("8", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let config = HubConfig::new(CAPACITY).with_overflow(OverflowPolicy::DropNewest);
                let hub = BroadcastHub::with_config(config).unwrap();
                let mut receivers = Vec::with_capacity(8);
                for _ in 0..8 {
                    receivers.push(hub.allocate().await.unwrap().into_channel());
                }

                let start = Instant::now();
                for i in 0..iters {
                    hub.publish(i).await.unwrap();
                    for rx in &mut receivers {
                        black_box(rx.recv().await);
                    }
                }
                let elapsed = start.elapsed();

                hub.release().await.unwrap();
                elapsed
            })
        });
    });

    group.finish();
}

/// Benchmark collect fan-in across source counts.
fn bench_collect_fanin(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("collect_fanin");

    for sources in [1usize, 8, 64] {
        group.throughput(Throughput::Elements(sources as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(sources),
            &sources,
            |b, &sources| {
                b.iter_custom(|iters| {
                    rt.block_on(async {
                        let (hub, mut aggregate) = CollectHub::new(CAPACITY).unwrap();
                        let mut senders = Vec::with_capacity(sources);
                        for _ in 0..sources {
                            senders.push(hub.allocate().await.unwrap().into_channel());
                        }

                        let start = Instant::now();
                        for i in 0..iters {
                            for tx in &senders {
                                tx.send(i).await.unwrap();
                            }
                            for _ in 0..sources {
                                black_box(aggregate.recv().await);
                            }
                        }
                        let elapsed = start.elapsed();

                        hub.release().await.unwrap();
                        elapsed
                    })
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_broadcast_fanout,
    bench_broadcast_drop_newest,
    bench_collect_fanin,
);
criterion_main!(benches);

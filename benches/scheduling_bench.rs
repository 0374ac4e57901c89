// benches/scheduling_bench.rs
//! Criterion benchmarks for shot partitioning and result reduction.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use seismic_toolbox::agents::partition::{round_robin, static_server_share, static_serverless_share};
use seismic_toolbox::agents::reduce_migration_result;
use seismic_toolbox::engine::{MigrationResult, ShotList};
use seismic_toolbox::group::LocalGroup;
use std::thread;

fn bench_partition(c: &mut Criterion) {
    let shots: ShotList = (0..10_000).collect();

    c.bench_function("round_robin_10k_over_64", |b| {
        b.iter(|| round_robin(black_box(&shots), 17, 64))
    });
    c.bench_function("static_server_share_10k_over_64", |b| {
        b.iter(|| static_server_share(black_box(&shots), 17, 64))
    });
    c.bench_function("static_serverless_share_10k_over_64", |b| {
        b.iter(|| static_serverless_share(black_box(&shots), 17, 64))
    });
}

fn bench_local_reduction(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_reduction_256x256");

    for size in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let handles: Vec<_> = LocalGroup::endpoints(size)
                    .into_iter()
                    .map(|mut endpoint| {
                        thread::spawn(move || {
                            let local = MigrationResult::new(256, 1, 256, 1)
                                .with_buffer("image", vec![1.0; 256 * 256])
                                .unwrap();
                            reduce_migration_result(&mut endpoint, local).unwrap()
                        })
                    })
                    .collect();

                for handle in handles {
                    black_box(handle.join().unwrap());
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_partition, bench_local_reduction);
criterion_main!(benches);

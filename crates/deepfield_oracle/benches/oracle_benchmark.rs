//! Benchmark for oracle throughput.
//!
//! TARGET: one 16x16 keccak chunk per millisecond per lane
//!
//! Run with: cargo bench --package deepfield_oracle --bench oracle_benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use deepfield_oracle::Oracle;
use deepfield_shared::{Coordinate, Footprint, HashMode, WorldConfig};

fn benchmark_single_hash(c: &mut Criterion) {
    let oracle = Oracle::new(&WorldConfig::default());

    c.bench_function("single_keccak_hash", |b| {
        let mut x = 0i32;
        b.iter(|| {
            x = x.wrapping_add(1);
            black_box(oracle.hash(black_box(Coordinate::new(x, -x))))
        });
    });
}

fn benchmark_chunk(c: &mut Criterion) {
    let mut group = c.benchmark_group("mine_chunk_16");
    group.throughput(Throughput::Elements(256));

    for mode in [HashMode::Keccak, HashMode::Fake] {
        let oracle = Oracle::new(&WorldConfig {
            hash_mode: mode,
            ..WorldConfig::default()
        });
        let footprint = Footprint::new(Coordinate::new(0, 0), 16);
        group.bench_function(format!("{mode:?}"), |b| {
            b.iter(|| black_box(oracle.mine_footprint(black_box(&footprint))));
        });
    }

    group.finish();
}

fn benchmark_sharded_chunk(c: &mut Criterion) {
    let oracle = Oracle::new(&WorldConfig::default());
    let footprint = Footprint::new(Coordinate::new(-256, 256), 64);

    let mut group = c.benchmark_group("mine_chunk_64_sharded");
    group.throughput(Throughput::Elements(footprint.area()));
    group.sample_size(20);

    for lanes in [1usize, 4] {
        group.bench_function(format!("{lanes}_lanes_serial"), |b| {
            b.iter(|| {
                for lane in 0..lanes {
                    black_box(oracle.mine_shard(&footprint, lane, lanes));
                }
            });
        });
    }

    group.finish();
}

fn benchmark_noise(c: &mut Criterion) {
    let oracle = Oracle::new(&WorldConfig::default());

    c.bench_function("perlin_value", |b| {
        let mut x = 0i32;
        b.iter(|| {
            x = x.wrapping_add(7);
            black_box(oracle.noise(black_box(Coordinate::new(x, x / 3))))
        });
    });
}

criterion_group!(
    benches,
    benchmark_single_hash,
    benchmark_chunk,
    benchmark_sharded_chunk,
    benchmark_noise,
);
criterion_main!(benches);

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::io::Cursor;

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use understory_sbn::{Envelope, QueryOnlyConfig, SbnQueryOnlyTree, SbnTree};

fn gen_grid_features(n: usize, cell: f64) -> Vec<(u32, Envelope)> {
    let mut out = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            let x0 = x as f64 * cell;
            let y0 = y as f64 * cell;
            out.push((out.len() as u32, Envelope::from_xywh(x0, y0, cell, cell)));
        }
    }
    out
}

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
    fn next_f64(&mut self) -> f64 {
        let v = self.next_u64() >> 11;
        (v as f64) / ((1u64 << 53) as f64)
    }
}

fn gen_random_features(count: usize, max_w: f64, max_h: f64, w: f64, h: f64) -> Vec<(u32, Envelope)> {
    let mut out = Vec::with_capacity(count);
    let mut rng = Rng::new(0xCAFE_F00D_DEAD_BEEF);
    for fid in 0..count {
        let x0 = rng.next_f64() * (max_w - w).max(1.0);
        let y0 = rng.next_f64() * (max_h - h).max(1.0);
        out.push((fid as u32, Envelope::from_xywh(x0, y0, w, h)));
    }
    out
}

fn gen_clustered_features(n_clusters: usize, per_cluster: usize, spread: f64) -> Vec<(u32, Envelope)> {
    let mut out = Vec::with_capacity(n_clusters * per_cluster);
    let mut rng = Rng::new(0xC1A5_7E55_9999_ABCD);
    let mut centers = Vec::with_capacity(n_clusters);
    for _ in 0..n_clusters {
        centers.push((rng.next_f64() * 2000.0, rng.next_f64() * 2000.0));
    }
    for (cx, cy) in centers {
        for _ in 0..per_cluster {
            let dx = (rng.next_f64() - 0.5) * spread;
            let dy = (rng.next_f64() - 0.5) * spread;
            out.push((out.len() as u32, Envelope::from_xywh(cx + dx, cy + dy, 12.0, 12.0)));
        }
    }
    out
}

fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("create");
    for &n in &[32usize, 64, 128] {
        let features = gen_grid_features(n, 10.0);
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_function(format!("grid_n{}", n), |b| {
            b.iter(|| {
                let tree = SbnTree::create(black_box(&features), None, None).unwrap();
                black_box(tree.levels());
            });
        });
    }
    let features = gen_clustered_features(32, 256, 150.0);
    group.throughput(Throughput::Elements(features.len() as u64));
    group.bench_function("clustered", |b| {
        b.iter(|| {
            let tree = SbnTree::create(black_box(&features), None, None).unwrap();
            black_box(tree.levels());
        });
    });
    group.finish();
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    let seed = gen_random_features(4096, 2000.0, 2000.0, 12.0, 12.0);
    let extra = gen_random_features(1024, 2000.0, 2000.0, 8.0, 8.0);
    group.throughput(Throughput::Elements(extra.len() as u64));
    group.bench_function("incremental_into_random", |b| {
        b.iter_batched(
            || SbnTree::create(&seed, None, None).unwrap(),
            |mut tree| {
                for (i, (_, env)) in extra.iter().enumerate() {
                    let _ = tree.insert(100_000 + i as u32, *env, None, None);
                }
                black_box(tree.feature_count());
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    let features = gen_random_features(65_536, 2000.0, 2000.0, 12.0, 12.0);
    let tree = SbnTree::create(&features, None, None).unwrap();
    let encoded = tree.to_bytes();
    let lazy = SbnQueryOnlyTree::from_readers(
        Cursor::new(encoded.sbn.clone()),
        Cursor::new(encoded.sbx.clone()),
        QueryOnlyConfig::default(),
    )
    .unwrap();

    let mut rng = Rng::new(0xBADC_F00D_1234_5678);
    let queries: Vec<Envelope> = (0..256)
        .map(|_| {
            let x = rng.next_f64() * 1800.0;
            let y = rng.next_f64() * 1800.0;
            Envelope::from_xywh(x, y, 200.0, 200.0)
        })
        .collect();

    group.throughput(Throughput::Elements(queries.len() as u64));
    group.bench_function("in_memory", |b| {
        b.iter(|| {
            let mut total = 0usize;
            for q in &queries {
                total += tree.query_fids(q).len();
            }
            black_box(total);
        });
    });
    group.bench_function("query_only_cached", |b| {
        b.iter(|| {
            let mut total = 0usize;
            for q in &queries {
                total += lazy.query_fids(q).unwrap().len();
            }
            black_box(total);
        });
    });
    group.bench_function("decode_then_query", |b| {
        b.iter(|| {
            let back = SbnTree::from_bytes(black_box(&encoded.sbn)).unwrap();
            black_box(back.query_fids(&queries[0]).len());
        });
    });
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let features = gen_grid_features(128, 8.0);
    let tree = SbnTree::create(&features, None, None).unwrap();
    group.throughput(Throughput::Elements(features.len() as u64));
    group.bench_function("to_bytes_n128", |b| {
        b.iter(|| black_box(tree.to_bytes().sbn.len()));
    });
    group.finish();
}

criterion_group!(benches, bench_create, bench_insert, bench_query, bench_encode);
criterion_main!(benches);

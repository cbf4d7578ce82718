// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use criterion::{BenchmarkId, Criterion, Throughput};
use sluice_stream::prelude::*;
use std::hint::black_box;
use tokio::runtime::Runtime;

pub fn bench_map_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_filter_fold");
    let rt = Runtime::new().unwrap();
    let materializer = rt.block_on(async { Materializer::new().unwrap() });

    for &size in &[1_000u64, 100_000u64] {
        let graph = Source::from_iter(0..size)
            .map(|x| x.wrapping_mul(31))
            .filter(|x| x % 2 == 0)
            .to_mat(Sink::fold(0u64, |acc, x| acc.wrapping_add(x)), Keep::right);

        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |bencher, _| {
            bencher.to_async(&rt).iter(|| async {
                let sum = graph.run_with(&materializer).unwrap().await.unwrap();
                black_box(sum)
            });
        });
    }

    group.finish();
}

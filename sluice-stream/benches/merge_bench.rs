// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use criterion::{BenchmarkId, Criterion, Throughput};
use sluice_stream::prelude::*;
use std::hint::black_box;
use tokio::runtime::Runtime;

pub fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    let rt = Runtime::new().unwrap();
    let materializer = rt.block_on(async { Materializer::new().unwrap() });

    for &size in &[1_000u64, 10_000u64] {
        group.throughput(Throughput::Elements(size * 2));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |bencher, &size| {
            bencher.to_async(&rt).iter(|| async {
                let count = Source::from_iter(0..size)
                    .merge(Source::from_iter(0..size))
                    .run_with(Sink::fold(0u64, |acc, _| acc + 1), &materializer)
                    .unwrap()
                    .await
                    .unwrap();
                black_box(count)
            });
        });
    }

    group.finish();
}

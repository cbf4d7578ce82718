// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use criterion::{BenchmarkId, Criterion, Throughput};
use sluice_core::Attributes;
use sluice_stream::prelude::*;
use std::hint::black_box;
use tokio::runtime::Runtime;

pub fn bench_async_boundary(c: &mut Criterion) {
    let mut group = c.benchmark_group("async_boundary");
    let rt = Runtime::new().unwrap();
    let materializer = rt.block_on(async { Materializer::new().unwrap() });
    let size = 10_000u64;

    for &buffer in &[1usize, 16, 256] {
        let graph = Source::from_iter(0..size)
            .async_boundary()
            .map(|x| x + 1)
            .with_attributes(Attributes::input_buffer(buffer, buffer))
            .to_mat(Sink::ignore(), Keep::right);

        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(buffer), &buffer, |bencher, _| {
            bencher.to_async(&rt).iter(|| async {
                graph.run_with(&materializer).unwrap().await.unwrap();
                black_box(())
            });
        });
    }

    group.finish();
}

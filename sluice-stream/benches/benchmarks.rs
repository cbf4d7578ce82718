// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

mod async_boundary_bench;
mod linear_bench;
mod merge_bench;

use async_boundary_bench::bench_async_boundary;
use criterion::{criterion_group, criterion_main};
use linear_bench::bench_map_fold;
use merge_bench::bench_merge;

criterion_group!(stream_benches, bench_map_fold, bench_merge, bench_async_boundary);
criterion_main!(stream_benches);

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::Attributes;
use sluice_stream::prelude::*;
use sluice_stream_time::TimeOps;
use sluice_test_utils::await_within;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_delay_shifts_elements_and_keeps_order() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::from_iter(1..=5).delay(Duration::from_millis(80));
    let started = Instant::now();

    // Act
    let result = await_within(1_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert_eq!(result, vec![1, 2, 3, 4, 5]);
    assert!(started.elapsed() >= Duration::from_millis(80));
    Ok(())
}

#[tokio::test]
async fn test_delay_with_single_slot_buffer_serializes_waits() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::from_iter(1..=3)
        .delay(Duration::from_millis(40))
        .with_attributes(Attributes::input_buffer(1, 1));
    let started = Instant::now();

    // Act
    let result = await_within(1_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert_eq!(result, vec![1, 2, 3]);
    assert!(started.elapsed() >= Duration::from_millis(120));
    Ok(())
}

#[tokio::test]
async fn test_take_within_completes_when_the_window_ends() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::repeat(1).take_within(Duration::from_millis(50));

    // Act
    let count = await_within(1_000, source.run_with(Sink::fold(0u64, |n, _| n + 1), &materializer)?).await?;

    // Assert
    assert!(count > 0);
    Ok(())
}

#[tokio::test]
async fn test_drop_within_skips_the_opening_window() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (queue, done) = Source::<i32>::queue(4, OverflowStrategy::Backpressure)
        .drop_within(Duration::from_millis(50))
        .to_mat(Sink::seq(), Keep::both)
        .run_with(&materializer)?;

    // Act
    queue.offer(1).await;
    tokio::time::sleep(Duration::from_millis(120)).await;
    queue.offer(2).await;
    queue.complete();
    let result = await_within(1_000, done).await?;

    // Assert
    assert_eq!(result, vec![2]);
    Ok(())
}

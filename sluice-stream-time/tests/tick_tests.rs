// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_stream::prelude::*;
use sluice_stream_time::tick;
use sluice_test_utils::await_within;
use std::time::Duration;

#[tokio::test]
async fn test_tick_emits_periodically() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = tick(Duration::from_millis(10), Duration::from_millis(10), 7).take(4);

    // Act
    let result = await_within(1_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert_eq!(result, vec![7, 7, 7, 7]);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_tick_completes_the_stream() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (handle, done) = tick(Duration::ZERO, Duration::from_millis(10), ())
        .to_mat(Sink::fold(0u32, |n, ()| n + 1), Keep::both)
        .run_with(&materializer)?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Act
    let first = handle.cancel();
    let second = handle.cancel();
    let count = await_within(1_000, done).await?;

    // Assert
    assert!(first);
    assert!(!second);
    assert!(handle.is_cancelled());
    assert!(count >= 1);
    Ok(())
}

#[tokio::test]
async fn test_ticks_without_demand_are_dropped() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (handle, queue) = tick(Duration::ZERO, Duration::from_millis(5), 1)
        .to_mat(Sink::queue(), Keep::both)
        .run_with(&materializer)?;

    // Act
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.cancel();
    let mut received = 0;
    while await_within(1_000, queue.pull()).await?.is_some() {
        received += 1;
    }

    // Assert
    assert!(received <= 1, "received {received} ticks");
    Ok(())
}

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_hub::{KillSwitch, KillSwitches, MergeHub};
use sluice_stream::prelude::*;
use sluice_test_utils::{assert_pending_for, await_within, test_error};
use std::time::Duration;

#[tokio::test]
async fn test_merges_every_producer() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (producer, collected) = MergeHub::source::<u32>(2)
        .take(30)
        .to_mat(Sink::seq(), Keep::both)
        .run_with(&materializer)?;

    // Act
    for start in [0, 10, 20] {
        Source::from_iter(start..start + 10).run_with(producer.clone(), &materializer)?;
    }
    let mut result = await_within(1_000, collected).await?;

    // Assert
    result.sort_unstable();
    assert_eq!(result, (0..30).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_keeps_each_producers_order() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (producer, collected) = MergeHub::source_with_threshold::<(u8, u32)>(4, 0.25)
        .take(200)
        .to_mat(Sink::seq(), Keep::both)
        .run_with(&materializer)?;

    // Act
    Source::from_iter(0..100)
        .map(|n| (0, n))
        .run_with(producer.clone(), &materializer)?;
    Source::from_iter(0..100)
        .map(|n| (1, n))
        .run_with(producer, &materializer)?;
    let result = await_within(2_000, collected).await?;

    // Assert
    for tag in [0, 1] {
        let own: Vec<u32> = result
            .iter()
            .filter(|(from, _)| *from == tag)
            .map(|(_, n)| *n)
            .collect();
        assert_eq!(own, (0..100).collect::<Vec<_>>());
    }
    Ok(())
}

#[tokio::test]
async fn test_slow_consumer_backpressures_producers() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (producer, queue) = MergeHub::source::<u32>(4)
        .to_mat(Sink::queue(), Keep::both)
        .run_with(&materializer)?;
    let mut produced = Source::from_iter(1..=1_000)
        .watch_termination(Keep::right)
        .to(producer)
        .run_with(&materializer)?;

    // Act
    assert_pending_for(&mut produced, 100).await;
    let first = await_within(1_000, queue.pull()).await?;
    let second = await_within(1_000, queue.pull()).await?;

    // Assert
    assert_eq!(first, Some(1));
    assert_eq!(second, Some(2));
    Ok(())
}

#[tokio::test]
async fn test_producer_failure_leaves_the_hub_running() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (producer, collected) = MergeHub::source::<u32>(8)
        .take(3)
        .to_mat(Sink::seq(), Keep::both)
        .run_with(&materializer)?;

    // Act
    Source::failed(test_error("broken producer")).run_with(producer.clone(), &materializer)?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    Source::from_iter(1..=3).run_with(producer, &materializer)?;
    let result = await_within(1_000, collected).await?;

    // Assert
    assert_eq!(result, vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_producers_attached_after_cancellation_stop_immediately() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let ((producer, switch), done) = MergeHub::source::<u32>(8)
        .via_mat(KillSwitches::single(), Keep::both)
        .to_mat(Sink::ignore(), Keep::both)
        .run_with(&materializer)?;
    switch.shutdown();
    await_within(1_000, done).await?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Act
    let pulled = Source::repeat(1u32)
        .watch_termination(Keep::right)
        .to(producer)
        .run_with(&materializer)?;

    // Assert
    await_within(1_000, pulled).await?;
    Ok(())
}

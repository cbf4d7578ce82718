// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_stream::prelude::*;
use sluice_stream_time::TimeOps;
use sluice_test_utils::await_within;
use std::time::Duration;

#[tokio::test]
async fn test_grouped_within_round_trip_preserves_elements() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::from_iter(1..=100).grouped_within(7, Duration::from_secs(5));

    // Act
    let groups = await_within(2_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert!(groups.iter().all(|group| !group.is_empty() && group.len() <= 7));
    assert_eq!(groups.concat(), (1..=100).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_full_groups_when_upstream_is_fast() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::from_iter(1..=6).grouped_within(3, Duration::from_secs(5));

    // Act
    let groups = await_within(2_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert_eq!(groups, vec![vec![1, 2, 3], vec![4, 5, 6]]);
    Ok(())
}

#[tokio::test]
async fn test_partial_group_is_flushed_by_the_timer() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (queue, groups) = Source::<i32>::queue(8, OverflowStrategy::Backpressure)
        .grouped_within(10, Duration::from_millis(50))
        .to_mat(Sink::queue(), Keep::both)
        .run_with(&materializer)?;

    // Act
    queue.offer(1).await;
    queue.offer(2).await;
    let first = await_within(1_000, groups.pull()).await?;
    queue.complete();
    let rest = await_within(1_000, groups.pull()).await?;

    // Assert
    assert_eq!(first, Some(vec![1, 2]));
    assert_eq!(rest, None);
    Ok(())
}

#[tokio::test]
async fn test_empty_stream_emits_no_groups() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::<i32>::empty().grouped_within(3, Duration::from_millis(10));

    // Act
    let groups = await_within(1_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert!(groups.is_empty());
    Ok(())
}

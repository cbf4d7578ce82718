// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice::prelude::*;
use sluice_test_utils::{await_within, test_error};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[tokio::test]
async fn test_channels_merge_through_a_hub_and_fan_out() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (producer, consumers) = MergeHub::source::<u32>(4)
        .take(6)
        .to_mat(BroadcastHub::sink(8), Keep::both)
        .run_with(&materializer)?;
    let sums = consumers.clone().run_with(Sink::fold(0, |sum, n| sum + n), &materializer)?;
    let counts = consumers.run_with(Sink::fold(0, |count, _| count + 1), &materializer)?;
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Act
    let (left_tx, left_rx) = mpsc::unbounded_channel();
    let (right_tx, right_rx) = mpsc::unbounded_channel();
    left_rx.into_source().run_with(producer.clone(), &materializer)?;
    right_rx.into_source().run_with(producer, &materializer)?;
    for n in 1..=3 {
        left_tx.send(n)?;
        right_tx.send(n * 100)?;
    }

    // Assert
    assert_eq!(await_within(1_000, sums).await?, 606);
    assert_eq!(await_within(1_000, counts).await?, 6);
    Ok(())
}

#[tokio::test]
async fn test_time_operators_apply_inside_substreams() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;

    // Act
    let mut groups = await_within(
        2_000,
        Source::from_iter(1..=10)
            .group_by(2, |n| n % 2)
            .grouped_within(3, Duration::from_millis(50))
            .merge_substreams()
            .run_with(Sink::seq(), &materializer)?,
    )
    .await?;

    // Assert
    groups.sort();
    assert_eq!(
        groups,
        vec![
            vec![1, 3, 5],
            vec![2, 4, 6],
            vec![7, 9],
            vec![8, 10],
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_kill_switch_stops_a_throttled_pipeline() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let start = Instant::now();
    let (switch, done) = Source::repeat(1)
        .throttle(1, Duration::from_millis(20), 0, ThrottleMode::Shaping)
        .via_mat(KillSwitches::single(), Keep::right)
        .to_mat(Sink::fold(0u32, |count, _| count + 1), Keep::both)
        .run_with(&materializer)?;
    tokio::time::sleep(Duration::from_millis(110)).await;

    // Act
    switch.shutdown();
    let count = await_within(1_000, done).await?;

    // Assert
    assert!((2..=8).contains(&count), "count {count}");
    assert!(start.elapsed() < Duration::from_millis(500));
    Ok(())
}

#[tokio::test]
async fn test_supervised_failure_inside_a_timed_pipeline() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;

    // Act
    let result = await_within(
        1_000,
        Source::from_iter(1..=6)
            .try_map(|n| {
                if n == 3 {
                    Err(test_error("three"))
                } else {
                    Ok(n)
                }
            })
            .with_supervision(sluice_core::supervision::resuming_decider())
            .idle_timeout(Duration::from_millis(200))
            .run_with(Sink::seq(), &materializer)?,
    )
    .await?;

    // Assert
    assert_eq!(result, vec![1, 2, 4, 5, 6]);
    Ok(())
}

#[tokio::test]
async fn test_shared_switch_aborts_producers_feeding_a_hub() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let switch = SharedKillSwitch::new("producers");
    let (producer, queue) = MergeHub::source::<u32>(2)
        .to_mat(Sink::queue(), Keep::both)
        .run_with(&materializer)?;
    let first = Source::repeat(1)
        .via(switch.flow())
        .watch_termination(Keep::right)
        .to(producer.clone())
        .run_with(&materializer)?;
    let second = Source::repeat(2)
        .via(switch.flow())
        .watch_termination(Keep::right)
        .to(producer)
        .run_with(&materializer)?;
    let pulled = await_within(1_000, queue.pull()).await?;

    // Act
    switch.abort(test_error("maintenance"));

    // Assert
    assert!(pulled.is_some());
    assert!(await_within(1_000, first).await.is_err());
    assert!(await_within(1_000, second).await.is_err());
    Ok(())
}

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::StreamError;
use sluice_stream::prelude::*;
use sluice_stream_time::TimeOps;
use sluice_test_utils::await_within;
use std::time::Duration;

#[tokio::test]
async fn test_initial_timeout_fails_a_silent_source() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (_queue, done) = Source::<i32>::queue(1, OverflowStrategy::Backpressure)
        .initial_timeout(Duration::from_millis(50))
        .to_mat(Sink::seq(), Keep::both)
        .run_with(&materializer)?;

    // Act
    let result = await_within(1_000, done).await;

    // Assert
    assert!(matches!(result, Err(StreamError::TimeoutError { .. })));
    Ok(())
}

#[tokio::test]
async fn test_initial_timeout_is_disarmed_by_the_first_element() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (queue, done) = Source::<i32>::queue(1, OverflowStrategy::Backpressure)
        .initial_timeout(Duration::from_millis(50))
        .to_mat(Sink::seq(), Keep::both)
        .run_with(&materializer)?;

    // Act
    queue.offer(1).await;
    tokio::time::sleep(Duration::from_millis(120)).await;
    queue.complete();
    let result = await_within(1_000, done).await?;

    // Assert
    assert_eq!(result, vec![1]);
    Ok(())
}

#[tokio::test]
async fn test_idle_timeout_fails_after_a_gap() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (queue, done) = Source::<i32>::queue(1, OverflowStrategy::Backpressure)
        .idle_timeout(Duration::from_millis(60))
        .to_mat(Sink::seq(), Keep::both)
        .run_with(&materializer)?;

    // Act
    for i in 0..3 {
        queue.offer(i).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let result = await_within(1_000, done).await;

    // Assert
    match result {
        Err(StreamError::TimeoutError { context }) => assert!(context.contains("no element for")),
        other => panic!("expected TimeoutError, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_completion_timeout_fails_an_endless_stream() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::repeat(1).completion_timeout(Duration::from_millis(50));

    // Act
    let result = await_within(1_000, source.run_with(Sink::ignore(), &materializer)?).await;

    // Assert
    assert!(matches!(result, Err(StreamError::TimeoutError { .. })));
    Ok(())
}

#[tokio::test]
async fn test_completion_timeout_leaves_fast_streams_alone() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::from_iter(1..=10).completion_timeout(Duration::from_secs(1));

    // Act
    let sum = await_within(1_000, source.run_with(Sink::fold(0, |a, x| a + x), &materializer)?).await?;

    // Assert
    assert_eq!(sum, 55);
    Ok(())
}

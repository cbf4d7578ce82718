// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::StreamError;
use sluice_hub::BroadcastHub;
use sluice_stream::prelude::*;
use sluice_test_utils::{assert_pending_for, await_within, test_error};
use std::time::Duration;

const ATTACH_GRACE: Duration = Duration::from_millis(30);

#[tokio::test]
async fn test_every_consumer_receives_every_element() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (queue, consumers) = Source::queue(4, OverflowStrategy::Backpressure)
        .to_mat(BroadcastHub::sink(4), Keep::both)
        .run_with(&materializer)?;
    let first = consumers.clone().run_with(Sink::seq(), &materializer)?;
    let second = consumers.run_with(Sink::seq(), &materializer)?;
    tokio::time::sleep(ATTACH_GRACE).await;

    // Act
    for n in 1..=20 {
        assert!(queue.offer(n).await.is_enqueued());
    }
    queue.complete();

    // Assert
    let expected: Vec<i32> = (1..=20).collect();
    assert_eq!(await_within(1_000, first).await?, expected);
    assert_eq!(await_within(1_000, second).await?, expected);
    Ok(())
}

#[tokio::test]
async fn test_hub_waits_for_a_consumer() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (mut watched, consumers) = Source::from_iter(1..=3)
        .watch_termination(Keep::right)
        .to_mat(BroadcastHub::sink(1), Keep::both)
        .run_with(&materializer)?;

    // Act
    assert_pending_for(&mut watched, 50).await;
    let result = await_within(1_000, consumers.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert_eq!(result, vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_late_consumer_only_sees_new_elements() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (queue, consumers) = Source::queue(4, OverflowStrategy::Backpressure)
        .to_mat(BroadcastHub::sink(8), Keep::both)
        .run_with(&materializer)?;
    let early = consumers.clone().run_with(Sink::seq(), &materializer)?;
    tokio::time::sleep(ATTACH_GRACE).await;
    for n in 1..=3 {
        assert!(queue.offer(n).await.is_enqueued());
    }
    tokio::time::sleep(ATTACH_GRACE).await;

    // Act
    let late = consumers.run_with(Sink::seq(), &materializer)?;
    tokio::time::sleep(ATTACH_GRACE).await;
    for n in 4..=6 {
        assert!(queue.offer(n).await.is_enqueued());
    }
    queue.complete();

    // Assert
    assert_eq!(await_within(1_000, early).await?, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(await_within(1_000, late).await?, vec![4, 5, 6]);
    Ok(())
}

#[tokio::test]
async fn test_completion_reaches_consumers_attaching_afterwards() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let consumers = Source::from_iter(1..=3)
        .run_with(BroadcastHub::sink(4), &materializer)?;
    let first = consumers.clone().run_with(Sink::seq(), &materializer)?;
    assert_eq!(await_within(1_000, first).await?, vec![1, 2, 3]);
    tokio::time::sleep(ATTACH_GRACE).await;

    // Act
    let late = consumers.run_with(Sink::seq(), &materializer)?;

    // Assert
    assert!(await_within(1_000, late).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failure_reaches_current_and_late_consumers() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (queue, consumers) = Source::<u32>::queue(4, OverflowStrategy::Backpressure)
        .to_mat(BroadcastHub::sink(4), Keep::both)
        .run_with(&materializer)?;
    let current = consumers.clone().run_with(Sink::ignore(), &materializer)?;
    tokio::time::sleep(ATTACH_GRACE).await;

    // Act
    queue.fail(test_error("hub source broke"));
    let current = await_within(1_000, current).await;
    tokio::time::sleep(ATTACH_GRACE).await;
    let late = await_within(1_000, consumers.run_with(Sink::ignore(), &materializer)?).await;

    // Assert
    for result in [current, late] {
        let error = result.expect_err("consumer must see the failure");
        assert!(error.to_string().contains("hub source broke"), "{error}");
    }
    Ok(())
}

#[tokio::test]
async fn test_cancelled_consumer_does_not_stall_the_others() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (queue, consumers) = Source::queue(2, OverflowStrategy::Backpressure)
        .to_mat(BroadcastHub::sink(2), Keep::both)
        .run_with(&materializer)?;
    let quitter = consumers.clone().take(1).run_with(Sink::seq(), &materializer)?;
    let stayer = consumers.run_with(Sink::seq(), &materializer)?;
    tokio::time::sleep(ATTACH_GRACE).await;

    // Act
    for n in 1..=10 {
        assert!(queue.offer(n).await.is_enqueued());
    }
    queue.complete();

    // Assert
    assert_eq!(await_within(1_000, quitter).await?, vec![1]);
    assert_eq!(await_within(1_000, stayer).await?, (1..=10).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_consumer_attaching_after_hub_shutdown_fails() -> anyhow::Result<()> {
    // Arrange
    let hub_materializer = Materializer::new()?;
    let consumer_materializer = Materializer::new()?;
    let consumers = Source::repeat(1).run_with(BroadcastHub::sink(4), &hub_materializer)?;
    tokio::time::sleep(ATTACH_GRACE).await;
    hub_materializer.shutdown();
    tokio::time::sleep(ATTACH_GRACE).await;

    // Act
    let result = await_within(
        1_000,
        consumers.run_with(Sink::ignore(), &consumer_materializer)?,
    )
    .await;

    // Assert
    assert!(
        matches!(result, Err(StreamError::AbruptTermination { .. })),
        "{result:?}"
    );
    Ok(())
}

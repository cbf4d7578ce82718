// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_stream::prelude::*;
use sluice_stream::QueueOfferResult;
use sluice_test_utils::{assert_pending_for, await_within, test_error};

#[tokio::test]
async fn test_source_queue_feeds_offered_elements() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (queue, done) = Source::queue(4, OverflowStrategy::Backpressure)
        .to_mat(Sink::seq(), Keep::both)
        .run_with(&materializer)?;

    // Act
    for x in 1..=3 {
        assert!(await_within(1_000, queue.offer(x)).await.is_enqueued());
    }
    queue.complete();

    // Assert
    assert_eq!(await_within(1_000, done).await?, vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_source_queue_backpressures_when_full() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (source_queue, sink_queue) = Source::queue(1, OverflowStrategy::Backpressure)
        .to_mat(Sink::queue(), Keep::both)
        .run_with(&materializer)?;
    assert!(await_within(1_000, source_queue.offer(1)).await.is_enqueued());

    // Act
    let mut blocked = Box::pin(source_queue.offer(2));
    assert_pending_for(&mut blocked, 50).await;
    let first = await_within(1_000, sink_queue.pull()).await?;

    // Assert
    assert_eq!(first, Some(1));
    assert!(await_within(1_000, blocked).await.is_enqueued());
    Ok(())
}

#[tokio::test]
async fn test_source_queue_drop_new_reports_dropped() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (source_queue, _sink_queue) = Source::queue(1, OverflowStrategy::DropNew)
        .to_mat(Sink::<i32>::queue(), Keep::both)
        .run_with(&materializer)?;

    // Act
    let first = await_within(1_000, source_queue.offer(1)).await;
    let second = await_within(1_000, source_queue.offer(2)).await;

    // Assert
    assert!(first.is_enqueued());
    assert!(matches!(second, QueueOfferResult::Dropped));
    Ok(())
}

#[tokio::test]
async fn test_source_queue_fail_fails_the_stream() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (queue, done) = Source::<i32>::queue(4, OverflowStrategy::Backpressure)
        .to_mat(Sink::seq(), Keep::both)
        .run_with(&materializer)?;

    // Act
    queue.fail(test_error("external"));
    let result = await_within(1_000, done).await;
    let offer = await_within(1_000, queue.offer(1)).await;

    // Assert
    assert!(result.is_err());
    assert!(!offer.is_enqueued());
    Ok(())
}

#[tokio::test]
async fn test_sink_queue_pulls_one_element_per_request() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let queue = Source::from_iter(vec![1, 2]).run_with(Sink::queue(), &materializer)?;

    // Act
    let first = await_within(1_000, queue.pull()).await?;
    let second = await_within(1_000, queue.pull()).await?;
    let end = await_within(1_000, queue.pull()).await?;
    let after_end = await_within(1_000, queue.pull()).await?;

    // Assert
    assert_eq!((first, second), (Some(1), Some(2)));
    assert_eq!(end, None);
    assert_eq!(after_end, None);
    Ok(())
}

#[tokio::test]
async fn test_sink_queue_reports_failure() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let queue = Source::<i32>::failed(test_error("upstream"))
        .run_with(Sink::queue(), &materializer)?;

    // Act
    let result = await_within(1_000, queue.pull()).await;

    // Assert
    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn test_sink_queue_cancel_cancels_upstream() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (termination, queue) = Source::repeat(1)
        .watch_termination(Keep::right)
        .to_mat(Sink::queue(), Keep::both)
        .run_with(&materializer)?;
    assert_eq!(await_within(1_000, queue.pull()).await?, Some(1));

    // Act
    queue.cancel();

    // Assert
    await_within(1_000, termination).await?;
    Ok(())
}

#[tokio::test]
async fn test_sink_queue_as_stream() -> anyhow::Result<()> {
    // Arrange
    use futures::StreamExt;
    let materializer = Materializer::new()?;
    let queue = Source::from_iter(1..=4).run_with(Sink::queue(), &materializer)?;

    // Act
    let items: Vec<i32> = queue
        .into_stream()
        .map(|item| item.unwrap_or(-1))
        .collect()
        .await;

    // Assert
    assert_eq!(items, vec![1, 2, 3, 4]);
    Ok(())
}

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::StreamError;
use sluice_stream::prelude::*;
use sluice_test_utils::{await_within, test_error};
use std::time::Duration;

async fn collect<T>(source: Source<T>) -> anyhow::Result<Vec<T>>
where
    T: Send + Sync + 'static,
{
    let materializer = Materializer::new()?;
    let completion = source.run_with(Sink::seq(), &materializer)?;
    Ok(await_within(2_000, completion).await?)
}

#[tokio::test]
async fn test_element_wise_operators() -> anyhow::Result<()> {
    // Arrange
    let source = Source::from_iter(1..=6)
        .map(|x| x * 10)
        .filter(|x| x % 20 == 0)
        .filter_map(|x| (x != 40).then_some(x + 1))
        .map_concat(|x| vec![x, x]);

    // Act
    let result = collect(source).await?;

    // Assert
    assert_eq!(result, vec![21, 21, 61, 61]);
    Ok(())
}

#[tokio::test]
async fn test_take_and_skip_family() -> anyhow::Result<()> {
    // Arrange
    let numbers = Source::from_iter(1..=10);

    // Act
    let taken = collect(numbers.clone().take(3)).await?;
    let skipped = collect(numbers.clone().skip(8)).await?;
    let while_small = collect(numbers.clone().take_while(|x| *x < 4)).await?;
    let inclusive = collect(numbers.clone().take_while_inclusive(|x| *x < 4)).await?;
    let after_small = collect(numbers.skip_while(|x| *x < 9)).await?;

    // Assert
    assert_eq!(taken, vec![1, 2, 3]);
    assert_eq!(skipped, vec![9, 10]);
    assert_eq!(while_small, vec![1, 2, 3]);
    assert_eq!(inclusive, vec![1, 2, 3, 4]);
    assert_eq!(after_small, vec![9, 10]);
    Ok(())
}

#[tokio::test]
async fn test_take_zero_completes_without_pulling() -> anyhow::Result<()> {
    // Arrange
    let source = Source::repeat(1).take(0);

    // Act
    let result = collect(source).await?;

    // Assert
    assert!(result.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_scan_emits_seed_then_running_state() -> anyhow::Result<()> {
    // Arrange
    let source = Source::from_iter(vec![1, 2, 3]).scan(0, |acc, x| acc + x);

    // Act
    let result = collect(source).await?;

    // Assert
    assert_eq!(result, vec![0, 1, 3, 6]);
    Ok(())
}

#[tokio::test]
async fn test_fold_of_empty_stream_emits_seed() -> anyhow::Result<()> {
    // Arrange
    let source = Source::<i32>::empty().fold(100, |acc, x| acc + x);

    // Act
    let result = collect(source).await?;

    // Assert
    assert_eq!(result, vec![100]);
    Ok(())
}

#[tokio::test]
async fn test_reduce_fails_on_empty_stream() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;

    // Act
    let reduced = collect(Source::from_iter(1..=4).reduce(|a, b| a * b)).await?;
    let empty = Source::<i32>::empty()
        .reduce(|a, b| a + b)
        .run_with(Sink::seq(), &materializer)?
        .await;

    // Assert
    assert_eq!(reduced, vec![24]);
    assert!(matches!(empty, Err(StreamError::EmptyStream { .. })));
    Ok(())
}

#[tokio::test]
async fn test_grouped_and_sliding() -> anyhow::Result<()> {
    // Arrange
    let numbers = Source::from_iter(1..=5);

    // Act
    let grouped = collect(numbers.clone().grouped(2)).await?;
    let sliding = collect(numbers.sliding(3, 1)).await?;

    // Assert
    assert_eq!(grouped, vec![vec![1, 2], vec![3, 4], vec![5]]);
    assert_eq!(sliding, vec![vec![1, 2, 3], vec![2, 3, 4], vec![3, 4, 5]]);
    Ok(())
}

#[tokio::test]
async fn test_intersperse_with_start_and_end() -> anyhow::Result<()> {
    // Arrange
    let source = Source::from_iter(vec!["a", "b", "c"]).intersperse_with("[", ",", "]");
    let empty = Source::<&str>::empty().intersperse_with("[", ",", "]");

    // Act
    let result = collect(source).await?.concat();
    let empty = collect(empty).await?.concat();

    // Assert
    assert_eq!(result, "[a,b,c]");
    assert_eq!(empty, "[]");
    Ok(())
}

#[tokio::test]
async fn test_buffer_drop_head_keeps_the_newest_elements() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let queue = Source::from_iter(1..=10)
        .buffer(3, OverflowStrategy::DropHead)
        .run_with(Sink::queue(), &materializer)?;

    // Act
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut result = Vec::new();
    while let Some(x) = await_within(1_000, queue.pull()).await? {
        result.push(x);
    }

    // Assert
    assert_eq!(result, vec![8, 9, 10]);
    Ok(())
}

#[tokio::test]
async fn test_buffer_fail_strategy_reports_overflow() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let queue = Source::from_iter(1..=10)
        .buffer(2, OverflowStrategy::Fail)
        .run_with(Sink::queue(), &materializer)?;

    // Act
    tokio::time::sleep(Duration::from_millis(50)).await;
    let result = await_within(1_000, queue.pull()).await;

    // Assert
    assert!(matches!(
        result,
        Err(StreamError::BufferOverflow { capacity: 2 })
    ));
    Ok(())
}

#[tokio::test]
async fn test_recover_replaces_failure_with_last_element() -> anyhow::Result<()> {
    // Arrange
    let source = Source::from_iter(vec![1, 2])
        .concat(Source::failed(test_error("broken")))
        .recover(|_| Some(-1));

    // Act
    let result = collect(source).await?;

    // Assert
    assert_eq!(result, vec![1, 2, -1]);
    Ok(())
}

#[tokio::test]
async fn test_map_error_rewrites_the_failure() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;

    // Act
    let result = Source::<i32>::failed(test_error("raw"))
        .map_error(|error| StreamError::stream_error(format!("wrapped: {error}")))
        .run_with(Sink::seq(), &materializer)?
        .await;

    // Assert
    match result {
        Err(StreamError::StreamProcessingError { context }) => {
            assert!(context.starts_with("wrapped:"));
        }
        other => panic!("expected a stream processing error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_concat_and_prepend_order_sources() -> anyhow::Result<()> {
    // Arrange
    let middle = Source::from_iter(vec![2, 3]);

    // Act
    let result = collect(
        middle
            .concat(Source::single(4))
            .prepend(Source::single(1)),
    )
    .await?;

    // Assert
    assert_eq!(result, vec![1, 2, 3, 4]);
    Ok(())
}

#[tokio::test]
async fn test_merge_delivers_every_element_once() -> anyhow::Result<()> {
    // Arrange
    let source = Source::from_iter(1..=50).merge(Source::from_iter(51..=100));

    // Act
    let mut result = collect(source).await?;
    result.sort_unstable();

    // Assert
    assert_eq!(result, (1..=100).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_zip_pairs_until_shorter_side_completes() -> anyhow::Result<()> {
    // Arrange
    let source = Source::from_iter(vec!['a', 'b', 'c']).zip(Source::from_iter(1..=2));

    // Act
    let result = collect(source).await?;

    // Assert
    assert_eq!(result, vec![('a', 1), ('b', 2)]);
    Ok(())
}

#[tokio::test]
async fn test_zip_with_infinite_side() -> anyhow::Result<()> {
    // Arrange
    let source = Source::from_iter(1..=3).zip_with(Source::repeat(10), |a, b| a * b);

    // Act
    let result = collect(source).await?;

    // Assert
    assert_eq!(result, vec![10, 20, 30]);
    Ok(())
}

#[tokio::test]
async fn test_also_to_feeds_a_side_sink() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let source = Source::from_iter(1..=3).also_to(Sink::for_each(move |x| {
        let _ = tx.send(x);
    }));

    // Act
    let main = source.run_with(Sink::seq(), &materializer)?.await?;
    let mut side = Vec::new();
    while side.len() < 3 {
        match await_within(1_000, rx.recv()).await {
            Some(x) => side.push(x),
            None => break,
        }
    }

    // Assert
    assert_eq!(main, vec![1, 2, 3]);
    assert_eq!(side, vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_flow_composition_is_reusable() -> anyhow::Result<()> {
    // Arrange
    let double_then_inc = Flow::<i32>::new().map(|x| x * 2).via(Flow::new().map(|x| x + 1));

    // Act
    let first = collect(Source::from_iter(1..=3).via(double_then_inc.clone())).await?;
    let second = collect(Source::single(10).via(double_then_inc)).await?;

    // Assert
    assert_eq!(first, vec![3, 5, 7]);
    assert_eq!(second, vec![21]);
    Ok(())
}

#[tokio::test]
async fn test_log_passes_elements_through() -> anyhow::Result<()> {
    // Arrange
    sluice_test_utils::init_tracing();
    let source = Source::from_iter(1..=3).log("numbers");

    // Act
    let result = collect(source).await?;

    // Assert
    assert_eq!(result, vec![1, 2, 3]);
    Ok(())
}

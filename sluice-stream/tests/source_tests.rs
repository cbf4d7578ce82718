// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::StreamError;
use sluice_stream::prelude::*;
use sluice_test_utils::{await_within, test_error, TestError};

#[tokio::test]
async fn test_from_iter_emits_elements_in_order() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;

    // Act
    let result = Source::from_iter(vec!["a", "b", "c"])
        .run_with(Sink::seq(), &materializer)?
        .await?;

    // Assert
    assert_eq!(result, vec!["a", "b", "c"]);
    Ok(())
}

#[tokio::test]
async fn test_single_and_empty_sources() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;

    // Act
    let single = Source::single(42).run_with(Sink::seq(), &materializer)?.await?;
    let empty = Source::<i32>::empty()
        .run_with(Sink::seq(), &materializer)?
        .await?;

    // Assert
    assert_eq!(single, vec![42]);
    assert!(empty.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_source_fails_the_completion() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;

    // Act
    let result = Source::<i32>::failed(test_error("boom"))
        .run_with(Sink::seq(), &materializer)?
        .await;

    // Assert
    let error = result.expect_err("failed source must fail the sink");
    assert_eq!(
        error.downcast_user_error::<TestError>(),
        Some(&TestError::new("boom"))
    );
    Ok(())
}

#[tokio::test]
async fn test_repeat_is_bounded_by_take() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;

    // Act
    let result = Source::repeat(7)
        .take(4)
        .run_with(Sink::seq(), &materializer)?
        .await?;

    // Assert
    assert_eq!(result, vec![7, 7, 7, 7]);
    Ok(())
}

#[tokio::test]
async fn test_unfold_generates_fibonacci_numbers() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let fibonacci = Source::unfold((0u64, 1u64), |(a, b)| {
        if a > 50 {
            return None;
        }
        Some(((b, a + b), a))
    });

    // Act
    let result = fibonacci.run_with(Sink::seq(), &materializer)?.await?;

    // Assert
    assert_eq!(result, vec![0, 1, 1, 2, 3, 5, 8, 13, 21, 34]);
    Ok(())
}

#[tokio::test]
async fn test_unfold_async_stops_on_none() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let countdown = Source::unfold_async(3u32, |n| async move {
        if n == 0 {
            return Ok(None);
        }
        Ok(Some((n - 1, n)))
    });

    // Act
    let result = countdown.run_with(Sink::seq(), &materializer)?.await?;

    // Assert
    assert_eq!(result, vec![3, 2, 1]);
    Ok(())
}

#[tokio::test]
async fn test_from_future_emits_its_output() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::from_future(async { Ok::<_, StreamError>(String::from("ready")) });

    // Act
    let first = source.clone().run_with(Sink::head(), &materializer)?.await?;
    let second = source.run_with(Sink::head(), &materializer)?.await?;

    // Assert
    assert_eq!(first, "ready");
    assert_eq!(second, "ready");
    Ok(())
}

#[tokio::test]
async fn test_from_stream_emits_stream_items() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::from_stream(futures::stream::iter(vec![1, 2, 3]));

    // Act
    let result = source.run_with(Sink::seq(), &materializer)?.await?;

    // Assert
    assert_eq!(result, vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_zip_n_combines_rounds_until_the_shortest_ends() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let sources = vec![
        Source::from_iter(vec![1, 2, 3]),
        Source::from_iter(vec![10, 20]),
        Source::from_iter(vec![100, 200, 300]),
    ];

    // Act
    let result = Source::zip_n(sources)
        .run_with(Sink::seq(), &materializer)?
        .await?;

    // Assert
    assert_eq!(result, vec![vec![1, 10, 100], vec![2, 20, 200]]);
    Ok(())
}

#[tokio::test]
async fn test_blueprint_runs_independently_each_time() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let graph = Source::from_iter(1..=4)
        .map(|x| x * x)
        .to_mat(Sink::fold(0, |acc, x| acc + x), Keep::right);

    // Act
    let first = graph.run_with(&materializer)?;
    let second = graph.run_with(&materializer)?;

    // Assert
    assert_eq!(await_within(1_000, first).await?, 30);
    assert_eq!(await_within(1_000, second).await?, 30);
    Ok(())
}

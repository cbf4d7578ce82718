// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::{Result, StreamError};
use sluice_stream::prelude::*;
use sluice_stream::Retry;
use sluice_test_utils::{await_within, test_error};

/// Flow failing every input whose attempt counter is below `succeed_at`.
fn flaky(succeed_at: u32) -> Flow<(i32, u32), (Result<i32>, u32)> {
    Flow::new().map(move |(value, attempt): (i32, u32)| {
        let result = if attempt < succeed_at {
            Err(test_error(format!("attempt {attempt}")))
        } else {
            Ok(value)
        };
        (result, attempt)
    })
}

#[tokio::test]
async fn test_retry_resubmits_until_success() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let retried = Retry::create(flaky(2), |attempt: &u32| Some((0, attempt + 1)));
    let source = Source::from_iter(vec![(5, 0u32), (6, 2u32)])
        .via(retried)
        .map(|(result, attempt)| (result.ok(), attempt));

    // Act
    let result = await_within(1_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert_eq!(result.len(), 2);
    assert!(result.contains(&(Some(6), 2)));
    assert!(result.contains(&(Some(0), 2)));
    Ok(())
}

#[tokio::test]
async fn test_retry_gives_up_when_asked() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let retried = Retry::create(flaky(u32::MAX), |attempt: &u32| {
        (*attempt < 3).then_some((1, attempt + 1))
    });
    let source = Source::single((1, 0u32))
        .via(retried)
        .map(|(result, attempt)| (result.is_err(), attempt));

    // Act
    let result = await_within(1_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert_eq!(result, vec![(true, 3)]);
    Ok(())
}

#[tokio::test]
async fn test_successful_results_pass_through_untouched() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let retried = Retry::create(flaky(0), |_: &u32| -> Option<(i32, u32)> {
        panic!("no retry expected")
    });
    let source = Source::from_iter((1..=5).map(|x| (x, 0u32)).collect::<Vec<_>>())
        .via(retried)
        .map(|(result, _)| result.ok());

    // Act
    let result = await_within(1_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert_eq!(result, vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);
    Ok(())
}

#[tokio::test]
async fn test_retry_with_several_elements_in_flight() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let inner = Flow::<(i32, u32)>::new()
        .buffer(4, OverflowStrategy::Backpressure)
        .map_async(3, |(value, attempt): (i32, u32)| async move {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            let result = if value % 2 == 0 && attempt == 0 {
                Err(test_error(format!("even {value}")))
            } else {
                Ok(value)
            };
            Ok((result, attempt))
        });
    let retried = Retry::create(inner, |attempt: &u32| Some((0, attempt + 1)));
    let source = Source::from_iter((1..=8).map(|x| (x, 0u32)).collect::<Vec<_>>())
        .via(retried)
        .map(|(result, attempt)| (result.ok(), attempt));

    // Act
    let result = await_within(2_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    // Every even input failed once and was replaced by a retried zero.
    let mut values: Vec<Option<i32>> = result.iter().map(|(value, _)| *value).collect();
    values.sort_unstable();
    assert_eq!(
        values,
        vec![Some(0), Some(0), Some(0), Some(0), Some(1), Some(3), Some(5), Some(7)]
    );
    assert_eq!(result.iter().filter(|(_, attempt)| *attempt == 1).count(), 4);
    Ok(())
}

#[tokio::test]
async fn test_retry_concat_expands_into_several_inputs() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let retried = Retry::concat(4, flaky(1), |attempt: &u32| {
        Some(vec![(10, attempt + 1), (20, attempt + 1)])
    });
    let source = Source::single((1, 0u32))
        .via(retried)
        .map(|(result, _)| result.ok());

    // Act
    let mut result = await_within(1_000, source.run_with(Sink::seq(), &materializer)?).await?;
    result.sort_unstable();

    // Assert
    assert_eq!(result, vec![Some(10), Some(20)]);
    Ok(())
}

#[tokio::test]
async fn test_retry_concat_fails_beyond_limit() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let retried = Retry::concat(2, flaky(u32::MAX), |attempt: &u32| {
        Some(vec![(0, attempt + 1); 3])
    });

    // Act
    let result = await_within(
        1_000,
        Source::single((1, 0u32))
            .via(retried)
            .run_with(Sink::ignore(), &materializer)?,
    )
    .await;

    // Assert
    assert!(matches!(result, Err(StreamError::BufferOverflow { capacity: 2 })));
    Ok(())
}

#[tokio::test]
async fn test_empty_retry_list_drops_the_failure() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let retried = Retry::concat(1, flaky(u32::MAX), |_: &u32| Some(Vec::new()));
    let source = Source::from_iter(vec![(1, 0u32), (2, 0u32)]).via(retried);

    // Act
    let result = await_within(1_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert!(result.is_empty());
    Ok(())
}

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::supervision::resuming_decider;
use sluice_core::StreamError;
use sluice_stream::prelude::*;
use sluice_stream_time::{ThrottleMode, TimeOps};
use sluice_test_utils::await_within;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_shaping_throttle_spaces_elements_in_order() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::from_iter(1..=5).throttle(
        1,
        Duration::from_millis(100),
        0,
        ThrottleMode::Shaping,
    );
    let started = Instant::now();

    // Act
    let result = await_within(5_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert_eq!(result, vec![1, 2, 3, 4, 5]);
    assert!(started.elapsed() >= Duration::from_millis(400));
    Ok(())
}

#[tokio::test]
async fn test_burst_passes_without_waiting() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::from_iter(1..=5).throttle(
        1,
        Duration::from_secs(10),
        5,
        ThrottleMode::Shaping,
    );
    let started = Instant::now();

    // Act
    let result = await_within(1_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert_eq!(result, vec![1, 2, 3, 4, 5]);
    assert!(started.elapsed() < Duration::from_secs(1));
    Ok(())
}

#[tokio::test]
async fn test_cost_function_charges_heavy_elements_more() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::from_iter(vec![3u64, 3]).throttle_with_cost(
        10,
        Duration::from_millis(500),
        3,
        |weight: &u64| *weight,
        ThrottleMode::Shaping,
    );
    let started = Instant::now();

    // Act
    let result = await_within(2_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert_eq!(result, vec![3, 3]);
    assert!(started.elapsed() >= Duration::from_millis(150));
    Ok(())
}

#[tokio::test]
async fn test_enforcing_throttle_fails_on_excess_rate() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::from_iter(1..=5).throttle(
        1,
        Duration::from_secs(10),
        1,
        ThrottleMode::Enforcing,
    );

    // Act
    let result = await_within(1_000, source.run_with(Sink::seq(), &materializer)?).await;

    // Assert
    assert!(matches!(result, Err(StreamError::RateExceeded { .. })));
    Ok(())
}

#[tokio::test]
async fn test_enforcing_throttle_with_resume_drops_excess() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::from_iter(1..=5)
        .throttle(1, Duration::from_secs(10), 2, ThrottleMode::Enforcing)
        .with_supervision(resuming_decider());

    // Act
    let result = await_within(1_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert_eq!(result, vec![1, 2]);
    Ok(())
}

#[tokio::test]
async fn test_throttle_completes_after_the_held_element() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::from_iter(vec!["a", "b"]).throttle(
        1,
        Duration::from_millis(50),
        0,
        ThrottleMode::Shaping,
    );

    // Act
    let last = await_within(1_000, source.run_with(Sink::last(), &materializer)?).await?;

    // Assert
    assert_eq!(last, "b");
    Ok(())
}

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::StreamError;
use sluice_hub::{KillSwitch, KillSwitches, SharedKillSwitch};
use sluice_stream::prelude::*;
use sluice_test_utils::{await_within, test_error};
use std::time::Duration;

#[tokio::test]
async fn test_shutdown_completes_downstream() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (switch, done) = Source::repeat(1)
        .via_mat(KillSwitches::single(), Keep::right)
        .to_mat(Sink::fold(0u64, |n, _| n + 1), Keep::both)
        .run_with(&materializer)?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Act
    switch.shutdown();
    let count = await_within(1_000, done).await?;

    // Assert
    assert!(switch.is_triggered());
    assert!(count > 0);
    Ok(())
}

#[tokio::test]
async fn test_abort_fails_downstream_with_the_given_error() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (switch, done) = Source::repeat(1)
        .via_mat(KillSwitches::single(), Keep::right)
        .to_mat(Sink::ignore(), Keep::both)
        .run_with(&materializer)?;

    // Act
    switch.abort(test_error("pulled the plug"));
    let result = await_within(1_000, done).await;

    // Assert
    let error = result.expect_err("aborted stream must fail");
    assert!(error.to_string().contains("pulled the plug"), "{error}");
    Ok(())
}

#[tokio::test]
async fn test_only_the_first_trigger_counts() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (switch, done) = Source::repeat(1)
        .via_mat(KillSwitches::single(), Keep::right)
        .to_mat(Sink::ignore(), Keep::both)
        .run_with(&materializer)?;

    // Act
    switch.shutdown();
    switch.abort(test_error("too late"));
    switch.shutdown();
    let result = await_within(1_000, done).await;

    // Assert
    assert!(result.is_ok(), "{result:?}");
    Ok(())
}

#[tokio::test]
async fn test_shared_switch_stops_every_bound_flow() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let switch = KillSwitches::shared("both");
    let first = Source::repeat(1)
        .via(switch.flow())
        .run_with(Sink::ignore(), &materializer)?;
    let second = Source::repeat("x")
        .via(switch.flow())
        .run_with(Sink::ignore(), &materializer)?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(switch.bound_flows(), 2);

    // Act
    switch.shutdown();

    // Assert
    await_within(1_000, first).await?;
    await_within(1_000, second).await?;
    assert_eq!(switch.bound_flows(), 0);
    assert_eq!(switch.name(), "both");
    Ok(())
}

#[tokio::test]
async fn test_flow_bound_after_abort_fails_immediately() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let switch = SharedKillSwitch::new("late");
    switch.abort(StreamError::stream_error("closed for the day"));

    // Act
    let result = await_within(
        1_000,
        Source::repeat(1)
            .via(switch.flow())
            .run_with(Sink::ignore(), &materializer)?,
    )
    .await;

    // Assert
    let error = result.expect_err("late flow must fail");
    assert!(error.to_string().contains("closed for the day"), "{error}");
    Ok(())
}

#[tokio::test]
async fn test_flow_bound_after_shutdown_completes_without_elements() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let switch = SharedKillSwitch::new("late");
    switch.shutdown();

    // Act
    let result = await_within(
        1_000,
        Source::from_iter(1..=3)
            .via(switch.flow())
            .run_with(Sink::seq(), &materializer)?,
    )
    .await?;

    // Assert
    assert!(result.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_triggers_apply_once() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let switch = SharedKillSwitch::new("race");
    let done = Source::repeat(1)
        .via(switch.flow())
        .run_with(Sink::ignore(), &materializer)?;

    // Act
    let mut handles = Vec::new();
    for n in 0..8 {
        let switch = switch.clone();
        handles.push(std::thread::spawn(move || {
            if n % 2 == 0 {
                switch.shutdown();
            } else {
                switch.abort(test_error("racing abort"));
            }
        }));
    }
    for handle in handles {
        handle.join().expect("trigger thread panicked");
    }

    // Assert
    let _ = await_within(1_000, done).await;
    assert!(switch.is_triggered());
    Ok(())
}

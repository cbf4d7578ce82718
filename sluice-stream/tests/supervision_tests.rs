// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::supervision::{self, Directive};
use sluice_core::StreamError;
use sluice_stream::prelude::*;
use sluice_test_utils::{await_within, fail_on, TestError};

#[tokio::test]
async fn test_resume_skips_the_failing_element_on_every_run() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let graph = Source::from_iter(1..=5)
        .try_map(fail_on(3))
        .with_supervision(supervision::resuming_decider())
        .to_mat(Sink::seq(), Keep::right);

    // Act
    let first = await_within(1_000, graph.run_with(&materializer)?).await?;
    let second = await_within(1_000, graph.run_with(&materializer)?).await?;

    // Assert
    assert_eq!(first, vec![1, 2, 4, 5]);
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn test_stop_is_the_default() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;

    // Act
    let result = Source::from_iter(1..=5)
        .try_map(fail_on(3))
        .run_with(Sink::seq(), &materializer)?
        .await;

    // Assert
    let error = result.expect_err("stopping decider must fail the stream");
    assert_eq!(
        error.downcast_user_error::<TestError>(),
        Some(&TestError::new("rejected 3"))
    );
    Ok(())
}

#[tokio::test]
async fn test_restart_resets_scan_state() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::from_iter(vec![1, 1, -1, 1, 1])
        .try_scan(0, |acc, x| {
            if x < 0 {
                return Err(StreamError::stream_error("negative"));
            }
            Ok(acc + x)
        })
        .with_supervision(supervision::restarting_decider());

    // Act
    let result = await_within(1_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert_eq!(result, vec![0, 1, 2, 1, 2]);
    Ok(())
}

#[tokio::test]
async fn test_resume_keeps_scan_state() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::from_iter(vec![1, 1, -1, 1, 1])
        .try_scan(0, |acc, x| {
            if x < 0 {
                return Err(StreamError::stream_error("negative"));
            }
            Ok(acc + x)
        })
        .with_supervision(supervision::resuming_decider());

    // Act
    let result = await_within(1_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert_eq!(result, vec![0, 1, 2, 3, 4]);
    Ok(())
}

#[tokio::test]
async fn test_decider_can_distinguish_errors() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let decider = supervision::decider(|error: &StreamError| match error {
        StreamError::UserError(_) => Directive::Resume,
        _ => Directive::Stop,
    });
    let source = Source::from_iter(1..=6)
        .try_map(|x| match x {
            2 => Err(sluice_test_utils::test_error("user")),
            5 => Err(StreamError::stream_error("fatal")),
            _ => Ok(x),
        })
        .with_supervision(decider);

    // Act
    let result = await_within(1_000, source.run_with(Sink::seq(), &materializer)?).await;

    // Assert
    assert!(matches!(result, Err(StreamError::StreamProcessingError { .. })));
    Ok(())
}

#[tokio::test]
async fn test_materializer_decider_applies_to_every_stage() -> anyhow::Result<()> {
    // Arrange
    let settings = MaterializerSettings::default().with_decider(supervision::resuming_decider());
    let materializer = Materializer::with_settings(settings)?;

    // Act
    let result = Source::from_iter(1..=4)
        .try_map(fail_on(2))
        .map(|x| x * 10)
        .run_with(Sink::seq(), &materializer)?
        .await?;

    // Assert
    assert_eq!(result, vec![10, 30, 40]);
    Ok(())
}

#[tokio::test]
async fn test_stage_decider_overrides_materializer_decider() -> anyhow::Result<()> {
    // Arrange
    let settings = MaterializerSettings::default().with_decider(supervision::resuming_decider());
    let materializer = Materializer::with_settings(settings)?;

    // Act
    let result = Source::from_iter(1..=4)
        .try_map(fail_on(2))
        .with_supervision(supervision::stopping_decider())
        .run_with(Sink::seq(), &materializer)?
        .await;

    // Assert
    assert!(result.is_err());
    Ok(())
}

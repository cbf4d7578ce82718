// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::StreamError;
use sluice_stream::prelude::*;
use sluice_test_utils::{await_within, test_error};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_head_and_last() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::from_iter(vec![5, 6, 7]);

    // Act
    let head = source.clone().run_with(Sink::head(), &materializer)?.await?;
    let last = source.run_with(Sink::last(), &materializer)?.await?;

    // Assert
    assert_eq!(head, 5);
    assert_eq!(last, 7);
    Ok(())
}

#[tokio::test]
async fn test_head_stops_an_infinite_source() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;

    // Act
    let head = Source::repeat(1).run_with(Sink::head(), &materializer)?;

    // Assert
    assert_eq!(await_within(1_000, head).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_head_of_empty_stream_fails() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;

    // Act
    let head = Source::<i32>::empty()
        .run_with(Sink::head(), &materializer)?
        .await;
    let head_option = Source::<i32>::empty()
        .run_with(Sink::head_option(), &materializer)?
        .await?;
    let last_option = Source::<i32>::empty()
        .run_with(Sink::last_option(), &materializer)?
        .await?;

    // Assert
    assert!(matches!(head, Err(StreamError::EmptyStream { .. })));
    assert_eq!(head_option, None);
    assert_eq!(last_option, None);
    Ok(())
}

#[tokio::test]
async fn test_for_each_sees_every_element() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);

    // Act
    Source::from_iter(1..=10)
        .run_with(
            Sink::for_each(move |x: usize| {
                counter.fetch_add(x, Ordering::SeqCst);
            }),
            &materializer,
        )?
        .await?;

    // Assert
    assert_eq!(seen.load(Ordering::SeqCst), 55);
    Ok(())
}

#[tokio::test]
async fn test_ignore_reports_failure() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;

    // Act
    let ok = Source::from_iter(1..=3)
        .run_with(Sink::ignore(), &materializer)?
        .await;
    let failed = Source::<i32>::failed(test_error("late"))
        .run_with(Sink::ignore(), &materializer)?
        .await;

    // Assert
    assert!(ok.is_ok());
    assert!(failed.is_err());
    Ok(())
}

#[tokio::test]
async fn test_on_complete_receives_the_outcome_once() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    // Act
    Source::from_iter(1..=3)
        .to(Sink::on_complete(move |result| {
            let _ = tx.send(result.is_ok());
        }))
        .run_with(&materializer)?;

    // Assert
    assert_eq!(await_within(1_000, rx.recv()).await, Some(true));
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_cancelled_sink_cancels_upstream() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;

    // Act
    let termination = Source::repeat(1)
        .watch_termination(Keep::right)
        .to_mat(Sink::cancelled(), Keep::left)
        .run_with(&materializer)?;

    // Assert
    await_within(1_000, termination).await?;
    Ok(())
}

#[tokio::test]
async fn test_watch_termination_reports_failure() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;

    // Act
    let (termination, done) = Source::<i32>::failed(test_error("watched"))
        .watch_termination(Keep::right)
        .to_mat(Sink::ignore(), Keep::both)
        .run_with(&materializer)?;

    // Assert
    assert!(await_within(1_000, termination).await.is_err());
    assert!(await_within(1_000, done).await.is_err());
    Ok(())
}

/// Element type that is neither `Clone` nor `Sync`.
#[derive(Debug, PartialEq)]
struct Ticket(u32, std::cell::Cell<bool>);

#[tokio::test]
async fn test_collecting_sinks_accept_elements_that_are_not_clone() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let tickets = || Source::from_iter(1..=3).map(|n| Ticket(n, std::cell::Cell::new(false)));

    // Act
    let all = tickets().run_with(Sink::seq(), &materializer)?.await?;
    let first = tickets().run_with(Sink::head_option(), &materializer)?.await?;
    let last = tickets().run_with(Sink::last(), &materializer)?.await?;

    // Assert
    assert_eq!(all.iter().map(|t| t.0).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(first.map(|t| t.0), Some(1));
    assert_eq!(last.0, 3);
    Ok(())
}

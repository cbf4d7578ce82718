// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice::prelude::*;
use sluice_test_utils::{assert_pending_for, await_within};
use tokio::sync::mpsc;

#[tokio::test]
async fn test_unbounded_receiver_source_completes_when_senders_drop() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (tx, rx) = mpsc::unbounded_channel();
    for n in 1..=5 {
        tx.send(n)?;
    }
    drop(tx);

    // Act
    let result = await_within(
        1_000,
        rx.into_source().map(|n| n * 10).run_with(Sink::seq(), &materializer)?,
    )
    .await?;

    // Assert
    assert_eq!(result, vec![10, 20, 30, 40, 50]);
    Ok(())
}

#[tokio::test]
async fn test_receiver_source_can_run_only_once() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (_tx, rx) = mpsc::channel::<u8>(1);
    let source = rx.into_source();
    let _running = source.clone().run_with(Sink::ignore(), &materializer)?;

    // Act
    let second = source.run_with(Sink::ignore(), &materializer);

    // Assert
    assert!(second.is_err());
    Ok(())
}

#[tokio::test]
async fn test_sender_sink_backpressures_on_a_full_channel() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (tx, mut rx) = mpsc::channel(2);
    let mut done = Source::from_iter(1..=5).run_with(tx.into_sink(), &materializer)?;

    // Act
    assert_pending_for(&mut done, 50).await;
    let mut received = Vec::new();
    while let Some(n) = await_within(1_000, rx.recv()).await {
        received.push(n);
        if received.len() == 5 {
            break;
        }
    }

    // Assert
    await_within(1_000, done).await?;
    assert_eq!(received, vec![1, 2, 3, 4, 5]);
    Ok(())
}

#[tokio::test]
async fn test_sender_sink_fails_when_receiver_is_dropped() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (tx, rx) = mpsc::channel::<u32>(1);
    drop(rx);

    // Act
    let result = await_within(
        1_000,
        Source::from_iter(1..=3).run_with(tx.into_sink(), &materializer)?,
    )
    .await;

    // Assert
    let error = result.expect_err("sending into a closed channel must fail");
    assert!(error.to_string().contains("receiver dropped"), "{error}");
    Ok(())
}

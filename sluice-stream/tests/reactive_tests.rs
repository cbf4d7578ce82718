// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use parking_lot::Mutex;
use sluice_core::{Attributes, StreamError, Subscriber, Subscription, SubscriptionTimeoutMode};
use sluice_stream::prelude::*;
use sluice_test_utils::await_within;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

#[derive(Debug)]
enum Signal {
    Subscribed,
    Next(i32),
    Error(StreamError),
    Complete,
}

/// Subscriber forwarding every signal to a channel, requesting one element at
/// a time.
struct RecordingSubscriber {
    signals: UnboundedSender<Signal>,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
}

impl RecordingSubscriber {
    fn new(signals: UnboundedSender<Signal>) -> Self {
        Self {
            signals,
            subscription: Mutex::new(None),
        }
    }

    fn request_one(&self) {
        let subscription = self.subscription.lock().clone();
        if let Some(subscription) = subscription {
            subscription.request(1);
        }
    }
}

impl Subscriber<i32> for RecordingSubscriber {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        *self.subscription.lock() = Some(Arc::clone(&subscription));
        let _ = self.signals.send(Signal::Subscribed);
        subscription.request(1);
    }

    fn on_next(&self, element: i32) {
        let _ = self.signals.send(Signal::Next(element));
        self.request_one();
    }

    fn on_error(&self, error: StreamError) {
        let _ = self.signals.send(Signal::Error(error));
    }

    fn on_complete(&self) {
        let _ = self.signals.send(Signal::Complete);
    }
}

#[tokio::test]
async fn test_publisher_feeds_a_source() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let publisher = Source::from_iter(1..=5).run_with(Sink::as_publisher(), &materializer)?;

    // Act
    let result = Source::from_publisher(Arc::new(publisher))
        .run_with(Sink::seq(), &materializer)?;

    // Assert
    assert_eq!(await_within(1_000, result).await?, vec![1, 2, 3, 4, 5]);
    Ok(())
}

#[tokio::test]
async fn test_publisher_signals_a_custom_subscriber() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let publisher = Source::from_iter(vec![7, 8]).run_with(Sink::as_publisher(), &materializer)?;
    let (tx, mut rx) = unbounded_channel();

    // Act
    sluice_core::Publisher::subscribe(&publisher, Arc::new(RecordingSubscriber::new(tx)));
    let mut signals = Vec::new();
    loop {
        let signal = await_within(1_000, rx.recv()).await;
        let done = matches!(signal, Some(Signal::Complete | Signal::Error(_)) | None);
        signals.extend(signal);
        if done {
            break;
        }
    }

    // Assert
    assert!(matches!(signals[0], Signal::Subscribed));
    assert!(matches!(signals[1], Signal::Next(7)));
    assert!(matches!(signals[2], Signal::Next(8)));
    assert!(matches!(signals[3], Signal::Complete));
    Ok(())
}

#[tokio::test]
async fn test_second_subscriber_is_rejected() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let publisher = Source::repeat(1).run_with(Sink::as_publisher(), &materializer)?;
    let (first_tx, mut first_rx) = unbounded_channel();
    let (second_tx, mut second_rx) = unbounded_channel();
    sluice_core::Publisher::subscribe(&publisher, Arc::new(RecordingSubscriber::new(first_tx)));
    assert!(matches!(
        await_within(1_000, first_rx.recv()).await,
        Some(Signal::Subscribed)
    ));

    // Act
    sluice_core::Publisher::subscribe(&publisher, Arc::new(RecordingSubscriber::new(second_tx)));

    // Assert
    assert!(matches!(
        await_within(1_000, second_rx.recv()).await,
        Some(Signal::Subscribed)
    ));
    assert!(matches!(
        await_within(1_000, second_rx.recv()).await,
        Some(Signal::Error(StreamError::SubscriberRejected { .. }))
    ));
    Ok(())
}

#[tokio::test]
async fn test_eager_subscriber_does_not_starve_other_tasks() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let publisher = Source::repeat(1).run_with(Sink::as_publisher(), &materializer)?;
    let (tx, mut rx) = unbounded_channel();
    sluice_core::Publisher::subscribe(&publisher, Arc::new(RecordingSubscriber::new(tx)));
    assert!(matches!(
        await_within(1_000, rx.recv()).await,
        Some(Signal::Subscribed)
    ));
    let started = tokio::time::Instant::now();

    // Act
    tokio::time::sleep(Duration::from_millis(20)).await;
    let next = rx.recv().await;

    // Assert
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(matches!(next, Some(Signal::Next(1))));
    Ok(())
}

#[tokio::test]
async fn test_subscriber_source_fed_by_subscriber_sink() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let (subscriber, result) = Source::<i32>::as_subscriber()
        .to_mat(Sink::seq(), Keep::both)
        .run_with(&materializer)?;

    // Act
    Source::from_iter(1..=3)
        .to(Sink::from_subscriber(Arc::new(subscriber)))
        .run_with(&materializer)?;

    // Assert
    assert_eq!(await_within(1_000, result).await?, vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_late_subscriber_sees_the_subscription_timeout() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let publisher = Source::repeat(1).run_with(
        Sink::as_publisher().with_attributes(Attributes::subscription_timeout(
            SubscriptionTimeoutMode::Cancel,
            Duration::from_millis(20),
        )),
        &materializer,
    )?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let (tx, mut rx) = unbounded_channel();

    // Act
    sluice_core::Publisher::subscribe(&publisher, Arc::new(RecordingSubscriber::new(tx)));

    // Assert
    assert!(matches!(
        await_within(1_000, rx.recv()).await,
        Some(Signal::Subscribed)
    ));
    assert!(matches!(
        await_within(1_000, rx.recv()).await,
        Some(Signal::Error(StreamError::SubscriptionTimeout { .. }))
    ));
    Ok(())
}

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Bridges between tokio channels and sluice blueprints.

use sluice_core::StreamError;
use sluice_stream::{Flow, FlowOps, Keep, Sink, Source, StreamCompletion};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};

/// Turn a channel receiver into a [`Source`].
///
/// The source drains the receiver as downstream demands and completes once
/// every sender is dropped. It wraps the receiver itself, so it can be
/// materialized only once.
///
/// # Examples
///
/// ```
/// use sluice::prelude::*;
/// use tokio::sync::mpsc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> sluice_core::Result<()> {
/// let (tx, rx) = mpsc::channel(4);
/// tokio::spawn(async move {
///     for n in 1..=3 {
///         let _ = tx.send(n).await;
///     }
/// });
///
/// let received = rx
///     .into_source()
///     .run_with(Sink::seq(), &Materializer::new()?)?
///     .await?;
/// assert_eq!(received, vec![1, 2, 3]);
/// # Ok(())
/// # }
/// ```
pub trait ReceiverExt<T> {
    /// Source emitting everything sent into the channel.
    fn into_source(self) -> Source<T>;
}

impl<T: Send + 'static> ReceiverExt<T> for mpsc::Receiver<T> {
    fn into_source(self) -> Source<T> {
        Source::from_stream(ReceiverStream::new(self)).named("channel_source")
    }
}

impl<T: Send + 'static> ReceiverExt<T> for mpsc::UnboundedReceiver<T> {
    fn into_source(self) -> Source<T> {
        Source::from_stream(UnboundedReceiverStream::new(self)).named("unbounded_channel_source")
    }
}

/// Turn a bounded channel sender into a [`Sink`].
///
/// Each element waits for channel capacity before the next one is pulled, so
/// a full channel backpressures the stream. Dropping the receiver fails the
/// stream.
pub trait SenderExt<T> {
    /// Sink sending every element into the channel.
    fn into_sink(self) -> Sink<T, StreamCompletion<()>>;
}

impl<T: Send + 'static> SenderExt<T> for mpsc::Sender<T> {
    fn into_sink(self) -> Sink<T, StreamCompletion<()>> {
        Flow::<T>::new()
            .map_async(1, move |element| {
                let sender = self.clone();
                async move {
                    sender
                        .send(element)
                        .await
                        .map_err(|_| StreamError::stream_error("channel receiver dropped"))
                }
            })
            .named("channel_sink")
            .to_mat(Sink::ignore(), Keep::right)
    }
}

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! One-shot materialized results such as `Sink::fold` or `watch_termination`.

use futures::channel::oneshot;
use pin_project::pin_project;
use sluice_core::{Result, StreamError};
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// Resolves exactly once with the outcome of a running stream.
///
/// If the stage that owns the other end stops without resolving it, the
/// completion fails with [`StreamError::AbruptTermination`].
#[pin_project]
#[derive(Debug)]
pub struct StreamCompletion<T> {
    #[pin]
    receiver: oneshot::Receiver<Result<T>>,
}

impl<T> Future for StreamCompletion<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match ready!(this.receiver.poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(oneshot::Canceled) => Poll::Ready(Err(StreamError::abrupt_termination(
                "stage stopped without resolving its completion",
            ))),
        }
    }
}

/// Writing end of a [`StreamCompletion`], held by the stage logic.
#[derive(Debug)]
pub struct CompletionPromise<T> {
    sender: Option<oneshot::Sender<Result<T>>>,
}

impl<T> CompletionPromise<T> {
    /// Resolve the completion. Later calls are ignored.
    pub fn complete(&mut self, result: Result<T>) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(result);
        }
    }

    /// Whether the completion was already resolved.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.sender.is_none()
    }

    /// Fail the completion unless it is already resolved; used from `post_stop`.
    pub fn abort(&mut self, cause: Option<&StreamError>) {
        let error = cause.cloned().unwrap_or_else(|| {
            StreamError::abrupt_termination("stage stopped without resolving its completion")
        });
        self.complete(Err(error));
    }
}

/// Create a connected promise and completion.
#[must_use]
pub fn completion<T>() -> (CompletionPromise<T>, StreamCompletion<T>) {
    let (sender, receiver) = oneshot::channel();
    (
        CompletionPromise {
            sender: Some(sender),
        },
        StreamCompletion { receiver },
    )
}

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Background tasks owned by a running stage.
//!
//! Timers, `map_async` futures and resource reads all run as [`StreamTask`]s. The
//! task is cancelled when its handle is dropped, so a stage that stops takes its
//! pending work down with it simply by dropping the handles it holds.

use crate::CancellationToken;
use std::future::Future;

/// Handle to a spawned background task with cancellation on drop.
///
/// # Example
///
/// ```rust
/// use sluice_core::StreamTask;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let task = StreamTask::spawn(|cancel| async move {
///     cancel
///         .run_until_cancelled(tokio::time::sleep(Duration::from_secs(60)))
///         .await;
/// });
///
/// assert!(!task.is_cancelled());
/// drop(task);
/// # }
/// ```
#[derive(Debug)]
pub struct StreamTask {
    cancel: CancellationToken,
}

impl StreamTask {
    /// Spawn `f` on the current tokio runtime.
    ///
    /// The closure receives the token that is cancelled when the returned handle
    /// is dropped or [`cancel`](Self::cancel)led; the future is expected to watch
    /// it. Use [`StreamTask::spawn_cancellable`] to have the future dropped at
    /// cancellation instead.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime, like `tokio::spawn`.
    #[cfg(feature = "runtime-tokio")]
    pub fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let future = f(cancel.clone());
        tokio::spawn(future);
        Self { cancel }
    }

    /// Spawn `future`, dropping it as soon as the task is cancelled.
    #[cfg(feature = "runtime-tokio")]
    pub fn spawn_cancellable<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn(|cancel| async move {
            cancel.run_until_cancelled(future).await;
        })
    }

    /// Request cancellation without waiting for the task to observe it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for StreamTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Await `future`, panicking when it does not finish within `timeout_ms`.
pub async fn await_within<F: Future>(timeout_ms: u64, future: F) -> F::Output {
    match timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(output) => output,
        Err(_) => panic!("future did not finish within {timeout_ms}ms"),
    }
}

/// Assert that `future` is still pending after `timeout_ms`.
///
/// The future is polled by reference, so the caller can keep awaiting it.
pub async fn assert_pending_for<F: Future + Unpin>(future: &mut F, timeout_ms: u64) {
    tokio::select! {
        _ = future => {
            panic!("future finished, expected it to stay pending for {timeout_ms}ms");
        }
        _ = sleep(Duration::from_millis(timeout_ms)) => {
        }
    }
}

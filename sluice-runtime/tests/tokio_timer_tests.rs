// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_runtime::runtime::Runtime;
use sluice_runtime::timer::Timer;
use sluice_runtime::{DefaultRuntime, TokioTimer};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_sleep_future_advances_clock() {
    // Arrange
    let timer = TokioTimer;
    let start = timer.now();

    // Act
    timer.sleep_future(Duration::from_millis(250)).await;

    // Assert
    assert!(timer.elapsed_since(start) >= Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn test_elapsed_since_future_instant_is_zero() {
    let timer = DefaultRuntime::timer();
    let later = timer.now() + Duration::from_secs(5);

    assert_eq!(timer.elapsed_since(later), Duration::ZERO);
}

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Injecting user errors into pipelines.

use sluice_core::{Result, StreamError};
use std::fmt::Debug;

/// User error raised by test closures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("test error: {message}")]
pub struct TestError {
    pub message: String,
}

impl TestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A [`StreamError::UserError`] wrapping a [`TestError`].
pub fn test_error(message: impl Into<String>) -> StreamError {
    StreamError::user_error(TestError::new(message))
}

/// Identity closure for `try_map` that fails on `rejected`.
///
/// The failure carries a [`TestError`] whose message is `rejected {value:?}`.
pub fn fail_on<T>(rejected: T) -> impl Fn(T) -> Result<T> + Send + Sync + 'static
where
    T: PartialEq + Debug + Send + Sync + 'static,
{
    move |value| {
        if value == rejected {
            return Err(test_error(format!("rejected {value:?}")));
        }
        Ok(value)
    }
}

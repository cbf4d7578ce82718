// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::{IntoStreamError, Result, ResultExt, StreamError};
use std::io;

#[test]
fn test_error_display() {
    let err = StreamError::stream_error("processing failed");
    assert_eq!(
        err.to_string(),
        "Stream processing error: processing failed"
    );
}

#[test]
fn test_only_protocol_violations_are_fatal() {
    assert!(StreamError::protocol_violation("double pull").is_fatal());
    assert!(!StreamError::stream_error("test").is_fatal());
    assert!(!StreamError::abrupt_termination("shutdown").is_fatal());
    assert!(!StreamError::buffer_overflow(4).is_fatal());
}

#[test]
fn test_clone_keeps_user_error_downcastable() {
    // Arrange
    let err = io::Error::other("disk gone").into_stream_error();

    // Act
    let cloned = err.clone();

    // Assert
    let inner = cloned
        .downcast_user_error::<io::Error>()
        .expect("user error should survive clone");
    assert_eq!(inner.to_string(), "disk gone");
}

#[test]
fn test_result_context_flattens_user_error() {
    let result: Result<()> = Err(StreamError::user_error(io::Error::other("test error")));

    let err = result.context("operation failed").unwrap_err();
    assert!(matches!(err, StreamError::StreamProcessingError { .. }));
    assert!(err.to_string().contains("operation failed"));
    assert!(err.to_string().contains("test error"));
}

#[test]
fn test_result_context_keeps_engine_errors() {
    let result: Result<()> = Err(StreamError::buffer_overflow(8));

    let err = result.with_context(|| "buffering".to_string()).unwrap_err();
    assert!(matches!(err, StreamError::BufferOverflow { capacity: 8 }));
}

#[test]
fn test_result_context_ok() {
    let result: Result<i32> = Ok(42);
    let value = result.context("operation failed").unwrap();
    assert_eq!(value, 42);
}

#[test]
fn test_io_error_converts_with_question_mark() {
    fn read() -> Result<()> {
        Err(io::Error::new(io::ErrorKind::NotFound, "missing"))?;
        Ok(())
    }

    let err = read().unwrap_err();
    assert!(err.downcast_user_error::<io::Error>().is_some());
}

#[test]
fn test_remote_is_the_only_wrapping_variant() {
    let cause = StreamError::timeout_error("5s");
    let remote = StreamError::remote("peer", cause);

    match remote {
        StreamError::Remote { origin, cause } => {
            assert_eq!(origin, "peer");
            assert!(matches!(*cause, StreamError::TimeoutError { .. }));
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::supervision::{self, Directive};
use sluice_core::{Attributes, LogLevel, StreamError, SubscriptionTimeoutMode};
use std::time::Duration;

#[test]
fn test_innermost_attribute_wins() {
    // Arrange
    let outer = Attributes::name("outer").and(Attributes::input_buffer(16, 16));
    let inner = Attributes::name("inner");

    // Act
    let effective = inner.nested_under(&outer);

    // Assert
    assert_eq!(effective.get_name(), Some("inner"));
    assert_eq!(effective.get_input_buffer(), Some((16, 16)));
}

#[test]
fn test_and_appends_more_specific_entries() {
    let attributes = Attributes::input_buffer(4, 16).and(Attributes::input_buffer(1, 1));

    assert_eq!(attributes.get_input_buffer(), Some((1, 1)));
}

#[test]
fn test_supervision_lookup_returns_inner_decider() {
    // Arrange
    let attributes = Attributes::supervision(supervision::stopping_decider())
        .and(Attributes::supervision(supervision::resuming_decider()));

    // Act
    let decider = attributes.get_decider().expect("decider expected");

    // Assert
    assert_eq!(decider(&StreamError::stream_error("x")), Directive::Resume);
}

#[test]
fn test_missing_attributes_are_none() {
    let attributes = Attributes::none();

    assert!(attributes.is_empty());
    assert!(attributes.get_name().is_none());
    assert!(attributes.get_decider().is_none());
    assert!(attributes.get_subscription_timeout().is_none());
    assert!(!attributes.is_async_boundary());
}

#[test]
fn test_timeout_and_log_levels() {
    let attributes = Attributes::subscription_timeout(
        SubscriptionTimeoutMode::Warn,
        Duration::from_millis(50),
    )
    .and(Attributes::log_levels(
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Error,
    ))
    .and(Attributes::async_boundary());

    assert_eq!(
        attributes.get_subscription_timeout(),
        Some((SubscriptionTimeoutMode::Warn, Duration::from_millis(50)))
    );
    assert_eq!(
        attributes.get_log_levels(),
        Some((LogLevel::Debug, LogLevel::Info, LogLevel::Error))
    );
    assert!(attributes.is_async_boundary());
}

#[test]
fn test_debug_output_hides_decider() {
    let attributes = Attributes::supervision(supervision::restarting_decider());

    assert!(format!("{attributes:?}").contains("Supervision(<decider>)"));
}

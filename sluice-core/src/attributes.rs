// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Stage and graph attributes.
//!
//! Attributes are an ordered list where entries further to the right are more
//! specific. When a composite is wrapped with extra attributes they are placed in
//! front of the ones it already carries, so the innermost setting always wins:
//!
//! ```
//! use sluice_core::Attributes;
//!
//! let inner = Attributes::name("inner").and(Attributes::input_buffer(1, 1));
//! let effective = inner.nested_under(&Attributes::name("outer"));
//!
//! assert_eq!(effective.get_name(), Some("inner"));
//! assert_eq!(effective.get_input_buffer(), Some((1, 1)));
//! ```

use crate::supervision::Decider;
use std::fmt;
use std::time::Duration;

/// Severity used by the `log` operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogLevel {
    /// Do not log
    Off,
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

/// Reaction to a substream or publisher that is not subscribed in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionTimeoutMode {
    /// Treat the substream as cancelled and fail a late subscriber with
    /// [`StreamError::SubscriptionTimeout`](crate::StreamError::SubscriptionTimeout).
    Cancel,
    /// Log a warning and keep waiting.
    Warn,
    /// Keep waiting silently.
    Noop,
}

/// A single attribute entry.
#[derive(Clone)]
pub enum Attribute {
    /// Human readable stage name used in logs and errors.
    Name(String),
    /// Buffer used by async boundaries and stream-crossing stages.
    InputBuffer {
        /// Elements requested when the boundary starts
        initial: usize,
        /// Maximum number of elements buffered
        max: usize,
    },
    /// Supervision policy for stage-local errors.
    Supervision(Decider),
    /// Marks the end of an island.
    AsyncBoundary,
    /// How long a substream may stay unsubscribed, and what happens then.
    SubscriptionTimeout {
        /// Reaction to the timeout
        mode: SubscriptionTimeoutMode,
        /// Time allowed between emission and subscription
        timeout: Duration,
    },
    /// Levels used by the `log` operator.
    LogLevels {
        /// Level for each element
        element: LogLevel,
        /// Level for completion
        finish: LogLevel,
        /// Level for failure
        failure: LogLevel,
    },
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.debug_tuple("Name").field(name).finish(),
            Self::InputBuffer { initial, max } => f
                .debug_struct("InputBuffer")
                .field("initial", initial)
                .field("max", max)
                .finish(),
            Self::Supervision(_) => f.write_str("Supervision(<decider>)"),
            Self::AsyncBoundary => f.write_str("AsyncBoundary"),
            Self::SubscriptionTimeout { mode, timeout } => f
                .debug_struct("SubscriptionTimeout")
                .field("mode", mode)
                .field("timeout", timeout)
                .finish(),
            Self::LogLevels {
                element,
                finish,
                failure,
            } => f
                .debug_struct("LogLevels")
                .field("element", element)
                .field("finish", finish)
                .field("failure", failure)
                .finish(),
        }
    }
}

/// Ordered attribute list, innermost last.
#[derive(Clone, Debug, Default)]
pub struct Attributes {
    entries: Vec<Attribute>,
}

impl Attributes {
    /// Empty attribute list.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// List holding a single attribute.
    #[must_use]
    pub fn from_attribute(attribute: Attribute) -> Self {
        Self {
            entries: vec![attribute],
        }
    }

    /// `Name` attribute.
    pub fn name(name: impl Into<String>) -> Self {
        Self::from_attribute(Attribute::Name(name.into()))
    }

    /// `InputBuffer` attribute.
    #[must_use]
    pub fn input_buffer(initial: usize, max: usize) -> Self {
        Self::from_attribute(Attribute::InputBuffer { initial, max })
    }

    /// `Supervision` attribute.
    #[must_use]
    pub fn supervision(decider: Decider) -> Self {
        Self::from_attribute(Attribute::Supervision(decider))
    }

    /// `AsyncBoundary` attribute.
    #[must_use]
    pub fn async_boundary() -> Self {
        Self::from_attribute(Attribute::AsyncBoundary)
    }

    /// `SubscriptionTimeout` attribute.
    #[must_use]
    pub fn subscription_timeout(mode: SubscriptionTimeoutMode, timeout: Duration) -> Self {
        Self::from_attribute(Attribute::SubscriptionTimeout { mode, timeout })
    }

    /// `LogLevels` attribute.
    #[must_use]
    pub fn log_levels(element: LogLevel, finish: LogLevel, failure: LogLevel) -> Self {
        Self::from_attribute(Attribute::LogLevels {
            element,
            finish,
            failure,
        })
    }

    /// Append `inner`, whose entries take precedence over `self`.
    #[must_use]
    pub fn and(mut self, inner: Attributes) -> Self {
        self.entries.extend(inner.entries);
        self
    }

    /// Place `outer` in front of `self` so that `self` keeps precedence.
    #[must_use]
    pub fn nested_under(&self, outer: &Attributes) -> Self {
        let mut entries = Vec::with_capacity(outer.entries.len() + self.entries.len());
        entries.extend(outer.entries.iter().cloned());
        entries.extend(self.entries.iter().cloned());
        Self { entries }
    }

    /// Whether the list has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, outermost first.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.entries.iter()
    }

    fn find<'a, T>(&'a self, pick: impl Fn(&'a Attribute) -> Option<T>) -> Option<T> {
        self.entries.iter().rev().find_map(pick)
    }

    /// Innermost name.
    #[must_use]
    pub fn get_name(&self) -> Option<&str> {
        self.find(|attribute| match attribute {
            Attribute::Name(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Innermost `(initial, max)` input buffer.
    #[must_use]
    pub fn get_input_buffer(&self) -> Option<(usize, usize)> {
        self.find(|attribute| match attribute {
            Attribute::InputBuffer { initial, max } => Some((*initial, *max)),
            _ => None,
        })
    }

    /// Innermost supervision decider.
    #[must_use]
    pub fn get_decider(&self) -> Option<Decider> {
        self.find(|attribute| match attribute {
            Attribute::Supervision(decider) => Some(decider.clone()),
            _ => None,
        })
    }

    /// Innermost subscription timeout setting.
    #[must_use]
    pub fn get_subscription_timeout(&self) -> Option<(SubscriptionTimeoutMode, Duration)> {
        self.find(|attribute| match attribute {
            Attribute::SubscriptionTimeout { mode, timeout } => Some((*mode, *timeout)),
            _ => None,
        })
    }

    /// Innermost `(element, finish, failure)` log levels.
    #[must_use]
    pub fn get_log_levels(&self) -> Option<(LogLevel, LogLevel, LogLevel)> {
        self.find(|attribute| match attribute {
            Attribute::LogLevels {
                element,
                finish,
                failure,
            } => Some((*element, *finish, *failure)),
            _ => None,
        })
    }

    /// Whether the list carries an async boundary marker.
    #[must_use]
    pub fn is_async_boundary(&self) -> bool {
        self.entries
            .iter()
            .any(|attribute| matches!(attribute, Attribute::AsyncBoundary))
    }
}

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Error types for the sluice stream engine.
//!
//! Every failure that can travel along a stream, be handed to a supervision
//! decider or resolve a materialized completion is a [`StreamError`]. The type is
//! `Clone` so that a single upstream failure can be fanned out to every outlet of a
//! junction without wrapping.
//!
//! # Examples
//!
//! ```
//! use sluice_core::{Result, StreamError};
//!
//! fn parse(raw: &str) -> Result<u32> {
//!     raw.parse::<u32>()
//!         .map_err(|_| StreamError::stream_error(format!("not a number: {raw}")))
//! }
//!
//! assert!(parse("12").is_ok());
//! assert!(matches!(
//!     parse("x"),
//!     Err(StreamError::StreamProcessingError { .. })
//! ));
//! ```

use std::sync::Arc;

/// Root error type for all stream operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    /// General failure raised by a stage or an operator.
    #[error("Stream processing error: {context}")]
    StreamProcessingError {
        /// Description of what went wrong
        context: String,
    },

    /// Error produced by user code, kept intact so that callers can downcast it.
    #[error("User error: {0}")]
    UserError(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// A stage broke the demand protocol (push without demand, double pull, grab
    /// of an empty port, double completion).
    ///
    /// Protocol violations are fatal: the whole region is aborted and the
    /// supervision decider is never consulted.
    #[error("Protocol violation: {context}")]
    ProtocolViolation {
        /// Which rule was broken and by whom
        context: String,
    },

    /// The graph could not be materialized (unconnected or doubly connected
    /// ports, port type mismatch, illegal cycle).
    #[error("Invalid graph: {context}")]
    InvalidGraph {
        /// Which part of the graph is malformed
        context: String,
    },

    /// The stage was stopped before it could produce its terminal signal, for
    /// instance because its materializer shut down.
    #[error("Abrupt termination: {context}")]
    AbruptTermination {
        /// Why the stage stopped
        context: String,
    },

    /// A bounded buffer with a `Fail` overflow policy was exceeded.
    #[error("Buffer overflow: capacity of {capacity} elements exceeded")]
    BufferOverflow {
        /// Capacity of the overflowing buffer
        capacity: usize,
    },

    /// A substream or publisher was not subscribed to in time.
    #[error("Subscription timeout: {context}")]
    SubscriptionTimeout {
        /// Which subscription timed out
        context: String,
    },

    /// A time-based operator exceeded its deadline.
    #[error("Timeout error: {context}")]
    TimeoutError {
        /// Context about the timeout (e.g. duration)
        context: String,
    },

    /// `group_by` was asked to open more substreams than allowed.
    #[error("Too many substreams: limit of {max} reached")]
    TooManySubstreams {
        /// Configured maximum
        max: usize,
    },

    /// An enforcing throttle received elements faster than its rate.
    #[error("Rate exceeded: {context}")]
    RateExceeded {
        /// Rate that was exceeded
        context: String,
    },

    /// A stage callback panicked. The panic is caught and supervised like an
    /// ordinary error.
    #[error("Stage callback panicked: {context}")]
    CallbackPanic {
        /// Panic payload rendered as text
        context: String,
    },

    /// A publisher refused an additional subscriber.
    #[error("Subscriber rejected: {reason}")]
    SubscriberRejected {
        /// Why the subscriber was rejected
        reason: String,
    },

    /// A subscription was asked for a non-positive amount of elements.
    #[error("Invalid demand: requested {requested} elements")]
    InvalidDemand {
        /// The offending request
        requested: u64,
    },

    /// An operator that needs at least one element saw none.
    #[error("Empty stream: {context}")]
    EmptyStream {
        /// Which operator required an element
        context: String,
    },

    /// Failure that crossed a stream reference. This is the only wrapping variant.
    #[error("Remote stream ({origin}) cause: {cause}")]
    Remote {
        /// Where the failure originated
        origin: String,
        /// The original failure
        #[source]
        cause: Arc<StreamError>,
    },
}

impl StreamError {
    /// Create a stream processing error with the given context
    pub fn stream_error(context: impl Into<String>) -> Self {
        Self::StreamProcessingError {
            context: context.into(),
        }
    }

    /// Wrap a user error
    pub fn user_error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::UserError(Arc::new(error))
    }

    /// Create a protocol violation error
    pub fn protocol_violation(context: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            context: context.into(),
        }
    }

    /// Create an invalid graph error
    pub fn invalid_graph(context: impl Into<String>) -> Self {
        Self::InvalidGraph {
            context: context.into(),
        }
    }

    /// Create an abrupt termination error
    pub fn abrupt_termination(context: impl Into<String>) -> Self {
        Self::AbruptTermination {
            context: context.into(),
        }
    }

    /// Create a buffer overflow error for a buffer of the given capacity
    pub const fn buffer_overflow(capacity: usize) -> Self {
        Self::BufferOverflow { capacity }
    }

    /// Create a subscription timeout error
    pub fn subscription_timeout(context: impl Into<String>) -> Self {
        Self::SubscriptionTimeout {
            context: context.into(),
        }
    }

    /// Create a timeout error with the given context
    pub fn timeout_error(context: impl Into<String>) -> Self {
        Self::TimeoutError {
            context: context.into(),
        }
    }

    /// Create a rate exceeded error with the given context
    pub fn rate_exceeded(context: impl Into<String>) -> Self {
        Self::RateExceeded {
            context: context.into(),
        }
    }

    /// Create an empty stream error
    pub fn empty_stream(context: impl Into<String>) -> Self {
        Self::EmptyStream {
            context: context.into(),
        }
    }

    /// Wrap an error that crossed a remote stream reference.
    ///
    /// ```
    /// use sluice_core::StreamError;
    ///
    /// let remote = StreamError::remote("node-a", StreamError::stream_error("boom"));
    /// assert_eq!(
    ///     remote.to_string(),
    ///     "Remote stream (node-a) cause: Stream processing error: boom"
    /// );
    /// ```
    pub fn remote(origin: impl Into<String>, cause: StreamError) -> Self {
        Self::Remote {
            origin: origin.into(),
            cause: Arc::new(cause),
        }
    }

    /// Protocol violations abort the whole region and bypass supervision.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ProtocolViolation { .. })
    }

    /// Check whether this error reports an abrupt termination.
    #[must_use]
    pub const fn is_abrupt_termination(&self) -> bool {
        matches!(self, Self::AbruptTermination { .. })
    }

    /// Try to view the wrapped user error as a concrete type.
    ///
    /// Returns `None` for every variant other than [`StreamError::UserError`], or
    /// when the wrapped error is of a different type.
    pub fn downcast_user_error<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::UserError(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Specialized Result type for stream operations
///
/// # Examples
///
/// ```
/// use sluice_core::Result;
///
/// fn process() -> Result<String> {
///     Ok("processed".to_string())
/// }
/// ```
pub type Result<T> = std::result::Result<T, StreamError>;

/// Extension trait for converting errors into `StreamError`
///
/// Implemented for every `std::error::Error + Send + Sync + 'static`, so user
/// closures can write `io_result.map_err(IntoStreamError::into_stream_error)?`.
pub trait IntoStreamError {
    /// Convert this error into a `StreamError`
    fn into_stream_error(self) -> StreamError;
}

impl<E: std::error::Error + Send + Sync + 'static> IntoStreamError for E {
    fn into_stream_error(self) -> StreamError {
        StreamError::user_error(self)
    }
}

/// Helper trait for adding context to `Result`s
pub trait ResultExt<T> {
    /// Add context to an error
    ///
    /// User errors are flattened into a [`StreamError::StreamProcessingError`]
    /// carrying both the context and the original message; other variants are
    /// returned unchanged.
    ///
    /// # Errors
    /// Returns `Err(StreamError)` if the underlying result is `Err`.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context to an error using a closure (lazy evaluation)
    ///
    /// # Errors
    /// Returns `Err(StreamError)` if the underlying result is `Err`.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<StreamError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| attach_context(e.into(), context.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| attach_context(e.into(), f()))
    }
}

fn attach_context(error: StreamError, context: String) -> StreamError {
    match error {
        StreamError::UserError(inner) => StreamError::StreamProcessingError {
            context: format!("{context}: {inner}"),
        },
        other => other,
    }
}

impl From<std::io::Error> for StreamError {
    fn from(error: std::io::Error) -> Self {
        Self::user_error(error)
    }
}

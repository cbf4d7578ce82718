// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Reactive Streams interfaces.
//!
//! These traits are the interoperability seam of the engine: a running stream can
//! be exposed as a [`Publisher`] or fed from one, and every async boundary between
//! two islands speaks this protocol internally.
//!
//! The Reactive Streams rules apply:
//!
//! - `on_subscribe` is signalled exactly once, before anything else
//! - `on_next` is never signalled beyond the demand requested through the
//!   [`Subscription`]
//! - at most one of `on_complete` / `on_error` is signalled, and nothing after it
//! - `request(0)` is illegal and is answered with
//!   [`StreamError::InvalidDemand`](crate::StreamError::InvalidDemand)

use crate::StreamError;
use std::sync::Arc;

/// Handle through which a subscriber signals demand or cancellation.
pub trait Subscription: Send + Sync {
    /// Request `n` more elements.
    fn request(&self, n: u64);

    /// Stop the flow of elements. Further calls are no-ops.
    fn cancel(&self);
}

/// Consumer side of the protocol.
pub trait Subscriber<T>: Send + Sync {
    /// Receive the subscription. Called once, before any other signal.
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);

    /// Receive the next element.
    fn on_next(&self, element: T);

    /// Receive the terminal failure.
    fn on_error(&self, error: StreamError);

    /// Receive the terminal completion.
    fn on_complete(&self);
}

/// Producer side of the protocol.
pub trait Publisher<T>: Send + Sync {
    /// Attach `subscriber`. Publishers that do not accept it signal
    /// `on_subscribe` followed by `on_error`.
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>);
}

/// Subscription that does nothing; handed to rejected subscribers.
#[derive(Debug, Default, Clone, Copy)]
pub struct CancelledSubscription;

impl Subscription for CancelledSubscription {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {}
}

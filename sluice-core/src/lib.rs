// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions, clippy::doc_markdown)]
//! Core types shared by every sluice crate.
//!
//! - [`StreamError`] and the [`Result`] alias
//! - [`Attributes`], the per-stage configuration list
//! - [`supervision`] directives and deciders
//! - [`OverflowStrategy`] for bounded buffers
//! - the [`reactive`] Publisher / Subscriber / Subscription traits
//! - [`CancellationToken`] and [`StreamTask`] for background work

pub mod attributes;
pub mod cancellation_token;
pub mod not_used;
pub mod overflow_strategy;
pub mod reactive;
pub mod stream_error;
pub mod stream_task;
pub mod supervision;

pub use self::attributes::{Attribute, Attributes, LogLevel, SubscriptionTimeoutMode};
pub use self::cancellation_token::CancellationToken;
pub use self::not_used::NotUsed;
pub use self::overflow_strategy::OverflowStrategy;
pub use self::reactive::{CancelledSubscription, Publisher, Subscriber, Subscription};
pub use self::stream_error::{IntoStreamError, Result, ResultExt, StreamError};
pub use self::stream_task::StreamTask;
pub use self::supervision::{Decider, Directive};

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! # Sluice
//!
//! Backpressured, stage-based stream processing.
//!
//! ## Overview
//!
//! Pipelines are described as immutable blueprints ([`Source`], [`Flow`],
//! [`Sink`]) and run by a [`Materializer`]. Every element travels on demand:
//! a stage emits only after its downstream pulled, so a slow consumer slows
//! the whole pipeline instead of filling unbounded buffers.
//!
//! This crate bundles the workspace:
//!
//! - [`sluice_core`] - errors, attributes, supervision and reactive interop
//!   contracts
//! - [`sluice_stream`] - the graph model, interpreter, materializer and the
//!   standard operators and junctions
//! - [`sluice_stream_time`] - timer-driven operators such as `throttle`,
//!   `grouped_within` and timeouts
//! - [`sluice_hub`] - kill switches and dynamic merge/broadcast hubs
//!
//! plus bridges from tokio channels ([`ReceiverExt`], [`SenderExt`]).
//!
//! ## Quick Start
//!
//! ```
//! use sluice::prelude::*;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> sluice_core::Result<()> {
//! let materializer = Materializer::new()?;
//!
//! let total = Source::from_iter(1..=100)
//!     .filter(|n| n % 2 == 0)
//!     .throttle(1_000, Duration::from_secs(1), 100, ThrottleMode::Shaping)
//!     .run_with(Sink::fold(0, |sum, n| sum + n), &materializer)?
//!     .await?;
//!
//! assert_eq!(total, 2550);
//! # Ok(())
//! # }
//! ```

mod channel_ext;

pub use channel_ext::{ReceiverExt, SenderExt};

pub use sluice_core;
pub use sluice_hub;
pub use sluice_runtime;
pub use sluice_stream;
pub use sluice_stream_time;

pub use sluice_core::{Attributes, NotUsed, OverflowStrategy, Result, StreamError};
pub use sluice_stream::{Flow, GraphDsl, Materializer, RunnableGraph, Sink, Source};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::channel_ext::{ReceiverExt, SenderExt};
    pub use sluice_core::{Attributes, Directive, StreamError};
    pub use sluice_hub::prelude::*;
    pub use sluice_stream::prelude::*;
    pub use sluice_stream_time::prelude::*;
}

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Time-based operators for sluice streams.
//!
//! Every operator is a stage driven by the interpreter's timers, so waiting
//! never blocks the island and backpressure keeps working while an element is
//! held back.
//!
//! # Overview
//!
//! - **[`TimeOps`]** - extension trait adding the operators to sources, flows
//!   and substreams
//! - **`throttle`** - token bucket rate limiting, shaping or enforcing
//! - **`grouped_within`** - size- and time-bounded batches
//! - **`initial_timeout`, `idle_timeout`, `completion_timeout`** - deadlines
//!   that fail the stream with `TimeoutError`
//! - **`delay`**, **`take_within`**, **`drop_within`** - time shifting and
//!   windows
//! - **[`tick`]** - periodic source with a cancellable handle
//!
//! # Example
//!
//! ```
//! use sluice_stream::prelude::*;
//! use sluice_stream_time::prelude::*;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> sluice_core::Result<()> {
//! let paced = Source::from_iter(1..=3)
//!     .throttle(1, Duration::from_millis(20), 0, ThrottleMode::Shaping)
//!     .completion_timeout(Duration::from_secs(1))
//!     .run_with(Sink::seq(), &Materializer::new()?)?
//!     .await?;
//!
//! assert_eq!(paced, vec![1, 2, 3]);
//! # Ok(())
//! # }
//! ```

mod delay;
mod grouped_within;
mod logging;
mod throttle;
mod tick;
mod time_ops;
mod timeout;
mod token_bucket;
mod within;

pub mod prelude;

pub use delay::Delay;
pub use grouped_within::GroupedWithin;
pub use throttle::{Throttle, ThrottleMode};
pub use tick::{tick, TickHandle};
pub use time_ops::TimeOps;
pub use timeout::{Timeout, TimeoutKind};
pub use within::{DropWithin, TakeWithin};

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Prelude module re-exporting the types needed to build and run pipelines.
//!
//! ```
//! use sluice_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> sluice_core::Result<()> {
//! let words = Source::from_iter(["a", "bb", "ccc"])
//!     .map(str::len)
//!     .run_with(Sink::seq(), &Materializer::new()?)?
//!     .await?;
//! assert_eq!(words, vec![1, 2, 3]);
//! # Ok(())
//! # }
//! ```
//!
//! # Contents
//!
//! - [`Source`], [`Flow`], [`Sink`] and [`RunnableGraph`] - blueprints
//! - [`FlowOps`] - operators shared by sources, flows and substreams
//! - [`SubFlow`] - operators applied to every substream
//! - [`GraphDsl`] - free-form graph construction
//! - [`Materializer`] and [`Keep`] - running graphs and picking their values

pub use crate::dsl::{Flow, FlowOps, GraphDsl, RunnableGraph, Sink, Source, SubFlow};
pub use crate::mat::Keep;
pub use crate::materializer::{Materializer, MaterializerSettings};
pub use sluice_core::{NotUsed, OverflowStrategy, StreamError};

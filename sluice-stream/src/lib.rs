// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Backpressured, stage-based stream processing.
//!
//! Pipelines are described as immutable blueprints and run by a
//! [`Materializer`]. Nothing happens until a closed graph is materialized; the
//! same blueprint can then run any number of times.
//!
//! # Architecture
//!
//! - **Blueprints**: [`Source`], [`Flow`] and [`Sink`] wrap a graph of stages
//!   with one open port each; [`RunnableGraph`] has none left open
//! - **Stages**: a [`GraphStage`] describes ports and creates a fresh
//!   [`StageLogic`] per run; logic reacts to push, pull, completion and
//!   cancellation signals through a [`StageContext`]
//! - **Islands**: stages run inside islands, each driven by one interpreter
//!   task; [`async_boundary`](FlowOps::async_boundary) splits islands
//! - **Materialized values**: every stage contributes a value, combined with
//!   [`Keep`] as blueprints are composed
//!
//! # Backpressure
//!
//! Elements move only after the receiving side has signalled demand. A stage
//! holds at most one element per inlet; buffering is always explicit, through
//! [`buffer`](FlowOps::buffer) or the per-island input buffers.
//!
//! ## Operator Categories
//!
//! ### Element-wise
//!
//! - **[`map`](FlowOps::map)**, **[`try_map`](FlowOps::try_map)**, **[`filter`](FlowOps::filter)**,
//!   **[`filter_map`](FlowOps::filter_map)**, **[`map_concat`](FlowOps::map_concat)**
//! - **[`map_async`](FlowOps::map_async)** and **[`map_async_unordered`](FlowOps::map_async_unordered)**
//!
//! ### Aggregation
//!
//! - **[`scan`](FlowOps::scan)**, **[`fold`](FlowOps::fold)**, **[`reduce`](FlowOps::reduce)**
//! - **[`grouped`](FlowOps::grouped)**, **[`sliding`](FlowOps::sliding)**
//!
//! ### Fan-in and fan-out
//!
//! - **[`merge`](FlowOps::merge)**, **[`concat`](FlowOps::concat)**, **[`zip`](FlowOps::zip)**
//! - the [`junctions`] module for graphs built with [`GraphDsl`]
//!
//! ### Substreams
//!
//! - **[`split_when`](FlowOps::split_when)**, **[`split_after`](FlowOps::split_after)**,
//!   **[`group_by`](FlowOps::group_by)** returning a [`SubFlow`]
//! - **[`flat_map_concat`](FlowOps::flat_map_concat)** and **[`flat_map_merge`](FlowOps::flat_map_merge)**
//!
//! # Example
//!
//! ```
//! use sluice_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> sluice_core::Result<()> {
//! let materializer = Materializer::new()?;
//! let total = Source::from_iter(1..=100)
//!     .filter(|x| x % 2 == 0)
//!     .run_with(Sink::fold(0, |acc, x| acc + x), &materializer)?
//!     .await?;
//!
//! assert_eq!(total, 2550);
//! # Ok(())
//! # }
//! ```

#![allow(clippy::multiple_crate_versions, clippy::doc_markdown)]
mod logging;
mod async_callback;
mod completion;
mod connection;
mod context;
pub mod dsl;
mod graph;
mod interpreter;
mod island;
pub mod junctions;
mod logic;
mod mat;
mod materializer;
mod port;
pub mod prelude;
mod retry;
mod shape;
mod stage;
pub mod stages;

// Re-export commonly used types
pub use async_callback::{AsyncCallback, CallbackSlot};
pub use completion::{completion, CompletionPromise, StreamCompletion};
pub use context::StageContext;
pub use dsl::{Flow, FlowOps, GraphDsl, RunnableGraph, Sink, Source, SubFlow};
pub use logic::{downcast_event, StageLogic, TimerKey};
pub use mat::{Keep, MatKey, MatValues};
pub use materializer::{Materializer, MaterializerSettings};
pub use port::{Inlet, Outlet, PortHandle, PortId, PortInfo};
pub use retry::Retry;
pub use shape::{
    BidiShape, ClosedShape, FanInShape2, FanOutShape2, FanOutShape3, FlowShape, Shape,
    SinkShape, SourceShape, UniformFanInShape, UniformFanOutShape,
};
pub use stage::GraphStage;
pub use stages::queue::{QueueOfferResult, SinkQueue, SourceQueue};
pub use stages::reactive::{StreamPublisher, StreamSubscriber};
pub use stages::resource::AsyncResource;
pub use stages::substream::SubstreamCancelStrategy;

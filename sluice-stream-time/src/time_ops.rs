// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::delay::Delay;
use crate::grouped_within::GroupedWithin;
use crate::throttle::{Throttle, ThrottleMode};
use crate::timeout::{Timeout, TimeoutKind};
use crate::within::{DropWithin, TakeWithin};
use sluice_stream::{Flow, FlowOps};
use std::time::Duration;

/// Time-based operators for every [`FlowOps`] blueprint: sources, flows and
/// substreams alike.
///
/// # Examples
///
/// ```
/// use sluice_stream::prelude::*;
/// use sluice_stream_time::{ThrottleMode, TimeOps};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> sluice_core::Result<()> {
/// let batches = Source::from_iter(1..=7)
///     .throttle(100, Duration::from_secs(1), 10, ThrottleMode::Shaping)
///     .grouped_within(3, Duration::from_secs(1))
///     .run_with(Sink::seq(), &Materializer::new()?)?
///     .await?;
///
/// assert_eq!(batches.concat(), (1..=7).collect::<Vec<_>>());
/// assert!(batches.iter().all(|batch| batch.len() <= 3));
/// # Ok(())
/// # }
/// ```
pub trait TimeOps: FlowOps {
    /// Limit the rate to `elements` per `per`, saving up to `maximum_burst`
    /// unused permits.
    ///
    /// [`ThrottleMode::Shaping`] delays early elements;
    /// [`ThrottleMode::Enforcing`] fails with
    /// [`RateExceeded`](sluice_core::StreamError::RateExceeded).
    fn throttle(
        self,
        elements: u32,
        per: Duration,
        maximum_burst: u32,
        mode: ThrottleMode,
    ) -> Self::Repr<Self::Out> {
        self.throttle_with_cost(elements, per, maximum_burst, |_: &Self::Out| 1, mode)
    }

    /// Like [`throttle`](Self::throttle), with each element costing
    /// `cost(&element)` of the `cost_units` allowed per `per`.
    fn throttle_with_cost<C>(
        self,
        cost_units: u32,
        per: Duration,
        maximum_burst: u32,
        cost: C,
        mode: ThrottleMode,
    ) -> Self::Repr<Self::Out>
    where
        C: Fn(&Self::Out) -> u64 + Send + Sync + 'static,
    {
        self.via(Flow::from_graph_stage(Throttle::new(
            cost_units,
            per,
            maximum_burst,
            cost,
            mode,
        )))
    }

    /// Chunk into groups of up to `max` elements, emitting a partial group
    /// once `interval` passes without an emission.
    fn grouped_within(self, max: usize, interval: Duration) -> Self::Repr<Vec<Self::Out>> {
        self.via(Flow::from_graph_stage(GroupedWithin::new(max, interval)))
    }

    /// Fail unless the first element arrives within `timeout`.
    fn initial_timeout(self, timeout: Duration) -> Self::Repr<Self::Out> {
        self.via(Flow::from_graph_stage(Timeout::new(TimeoutKind::Initial, timeout)))
    }

    /// Fail when no element passes for `timeout`.
    fn idle_timeout(self, timeout: Duration) -> Self::Repr<Self::Out> {
        self.via(Flow::from_graph_stage(Timeout::new(TimeoutKind::Idle, timeout)))
    }

    /// Fail unless the stream completes within `timeout`.
    fn completion_timeout(self, timeout: Duration) -> Self::Repr<Self::Out> {
        self.via(Flow::from_graph_stage(Timeout::new(TimeoutKind::Completion, timeout)))
    }

    /// Shift every element by `delay`.
    fn delay(self, delay: Duration) -> Self::Repr<Self::Out> {
        self.via(Flow::from_graph_stage(Delay::new(delay)))
    }

    /// Pass elements for `window`, then complete.
    fn take_within(self, window: Duration) -> Self::Repr<Self::Out> {
        self.via(Flow::from_graph_stage(TakeWithin::new(window)))
    }

    /// Drop elements for `window`, then pass the rest.
    fn drop_within(self, window: Duration) -> Self::Repr<Self::Out> {
        self.via(Flow::from_graph_stage(DropWithin::new(window)))
    }
}

impl<S: FlowOps> TimeOps for S {}

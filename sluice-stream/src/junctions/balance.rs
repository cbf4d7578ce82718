// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::context::StageContext;
use crate::logic::StageLogic;
use crate::shape::UniformFanOutShape;
use crate::stage::GraphStage;
use sluice_core::{Attributes, NotUsed, Result};
use std::collections::VecDeque;
use std::marker::PhantomData;

/// Hand each element to exactly one of `n` outlets.
///
/// Outlets are served in the order they signalled demand, so the outlet that
/// waited longest gets the next element.
///
/// # Behavior
///
/// - With [`wait_for_all_downstreams`](Self::wait_for_all_downstreams) nothing
///   is pulled until every outlet has signalled demand once
/// - A cancelled outlet is skipped; upstream is cancelled only when all outlets
///   have cancelled
/// - Upstream completion completes every outlet
///
/// # Examples
///
/// ```
/// use sluice_stream::junctions::Balance;
/// use sluice_stream::prelude::*;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> sluice_core::Result<()> {
/// let mut builder = GraphDsl::new();
/// let (source, _) = builder.add_source(Source::from_iter(1..=10));
/// let (balance, _) = builder.add_stage(Balance::<i32>::new(2));
/// let (left, left_key) = builder.add_sink(Sink::fold(0, |acc, x| acc + x));
/// let (right, right_key) = builder.add_sink(Sink::fold(0, |acc, x| acc + x));
/// builder.connect(source, balance.inlet);
/// builder.connect(balance.outlets[0], left);
/// builder.connect(balance.outlets[1], right);
///
/// let (left_sum, right_sum) = builder
///     .build_closed_with(move |values| Ok((values.take(left_key)?, values.take(right_key)?)))
///     .run_with(&Materializer::new()?)?;
///
/// assert_eq!(left_sum.await? + right_sum.await?, 55);
/// # Ok(())
/// # }
/// ```
pub struct Balance<T> {
    outputs: usize,
    wait_for_all_downstreams: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Balance<T> {
    /// Balance over `outputs` outlets.
    #[must_use]
    pub const fn new(outputs: usize) -> Self {
        Self {
            outputs,
            wait_for_all_downstreams: false,
            _marker: PhantomData,
        }
    }

    /// Balance that starts pulling only after every outlet signalled demand.
    #[must_use]
    pub const fn wait_for_all_downstreams(outputs: usize) -> Self {
        Self {
            outputs,
            wait_for_all_downstreams: true,
            _marker: PhantomData,
        }
    }
}

impl<T: Send + 'static> GraphStage for Balance<T> {
    type Shape = UniformFanOutShape<T, T>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        UniformFanOutShape::new(self.outputs)
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("balance")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = BalanceLogic {
            shape: self.shape(),
            waiting: VecDeque::with_capacity(self.outputs),
            seen: vec![false; self.outputs],
            started: !self.wait_for_all_downstreams,
            upstream_done: false,
        };
        Ok((Box::new(logic), NotUsed))
    }
}

struct BalanceLogic<T> {
    shape: UniformFanOutShape<T, T>,
    /// Outlets with demand, oldest first.
    waiting: VecDeque<usize>,
    /// Outlets that have pulled at least once.
    seen: Vec<bool>,
    started: bool,
    upstream_done: bool,
}

impl<T: Send + 'static> BalanceLogic<T> {
    fn next_outlet(&mut self, ctx: &StageContext<'_>) -> Option<usize> {
        while let Some(index) = self.waiting.pop_front() {
            if ctx.is_available(self.shape.outlets[index]) {
                return Some(index);
            }
        }
        None
    }

    /// Hand the available element out if someone waits, then ask for the next
    /// one.
    fn dispatch(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        if ctx.is_available(self.shape.inlet) {
            let Some(index) = self.next_outlet(ctx) else {
                return Ok(());
            };
            let element = ctx.grab(self.shape.inlet)?;
            ctx.push(self.shape.outlets[index], element)?;
        }
        if self.upstream_done {
            return ctx.complete_stage();
        }
        if !self.waiting.is_empty() {
            ctx.try_pull(self.shape.inlet)?;
        }
        Ok(())
    }
}

impl<T: Send + 'static> StageLogic for BalanceLogic<T> {
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        self.dispatch(ctx)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, outlet: usize) -> Result<()> {
        self.waiting.push_back(outlet);
        if !self.started {
            self.seen[outlet] = true;
            self.started = self.seen.iter().all(|&seen| seen);
        }
        self.dispatch(ctx)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        if ctx.is_available(self.shape.inlet) {
            self.upstream_done = true;
            return Ok(());
        }
        ctx.complete_stage()
    }

    fn on_downstream_finish(&mut self, ctx: &mut StageContext<'_>, outlet: usize) -> Result<()> {
        self.waiting.retain(|&index| index != outlet);
        self.seen[outlet] = true;
        if !self.started {
            self.started = self.seen.iter().all(|&seen| seen);
        }
        let all_cancelled = self
            .shape
            .outlets
            .iter()
            .all(|&outlet| ctx.is_closed(outlet));
        if all_cancelled {
            return ctx.complete_stage();
        }
        self.dispatch(ctx)
    }
}

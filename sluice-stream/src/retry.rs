// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Feeding failed results back into a flow.
//!
//! The wrapped flow and a coordinator stage form a cycle: the coordinator sends
//! inputs into the flow, inspects every result and either emits it or sends
//! follow-up inputs around again. The coordinator breaks the cycle by owning a
//! queue of pending inputs and never waiting for its own demand.

use crate::context::StageContext;
use crate::dsl::{Flow, GraphDsl};
use crate::logging::debug;
use crate::logic::StageLogic;
use crate::shape::BidiShape;
use crate::stage::GraphStage;
use sluice_core::{Attributes, NotUsed, Result, StreamError};
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

/// Retry wrappers around flows of `(input, state)` pairs.
///
/// The wrapped flow must emit exactly one `(Result<Out>, state)` for every
/// `(input, state)` it receives, in any order. The state travels with each
/// element and decides whether a failed result is retried.
///
/// # Examples
///
/// ```
/// use sluice_core::StreamError;
/// use sluice_stream::prelude::*;
/// use sluice_stream::Retry;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> sluice_core::Result<()> {
/// // Fails until the attempt counter reaches 3.
/// let flaky = Flow::<(u32, u32)>::new().map(|(value, attempt)| {
///     let result = if attempt < 3 {
///         Err(StreamError::stream_error("not yet"))
///     } else {
///         Ok(value * 10)
///     };
///     (result, attempt)
/// });
///
/// let retried = Retry::create(flaky, |attempt: &u32| Some((7, attempt + 1)));
/// let results = Source::single((7u32, 0u32))
///     .via(retried)
///     .map(|(result, attempts)| (result.ok(), attempts))
///     .run_with(Sink::seq(), &Materializer::new()?)?
///     .await?;
///
/// assert_eq!(results, vec![(Some(70), 3)]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Retry;

impl Retry {
    /// Retry failed results of `flow` for as long as `retry_with` returns a
    /// new `(input, state)` pair; `None` emits the failure unchanged.
    pub fn create<In, S, Out, M, F>(
        flow: Flow<(In, S), (Result<Out>, S), M>,
        retry_with: F,
    ) -> Flow<(In, S), (Result<Out>, S), M>
    where
        In: Send + 'static,
        S: Send + 'static,
        Out: Send + 'static,
        M: Send + 'static,
        F: Fn(&S) -> Option<(In, S)> + Send + Sync + 'static,
    {
        Self::concat(1, flow, move |state| retry_with(state).map(|retry| vec![retry]))
    }

    /// Like [`create`](Self::create), with a failure expanding into any
    /// number of follow-up inputs.
    ///
    /// Follow-up inputs are queued ahead of new upstream elements. An empty
    /// vector drops the failed result. When the queue would grow beyond
    /// `limit`, the stage fails with
    /// [`BufferOverflow`](StreamError::BufferOverflow).
    pub fn concat<In, S, Out, M, F>(
        limit: usize,
        flow: Flow<(In, S), (Result<Out>, S), M>,
        retry_with: F,
    ) -> Flow<(In, S), (Result<Out>, S), M>
    where
        In: Send + 'static,
        S: Send + 'static,
        Out: Send + 'static,
        M: Send + 'static,
        F: Fn(&S) -> Option<Vec<(In, S)>> + Send + Sync + 'static,
    {
        let mut builder = GraphDsl::new();
        let (coordinator, _) = builder.add_stage(RetryCoordinator {
            limit: limit.max(1),
            retry_with: Arc::new(retry_with),
            _marker: PhantomData,
        });
        let (inner, inner_key) = builder.add_flow(flow);
        builder.connect(coordinator.out1, inner.inlet);
        builder.connect(inner.outlet, coordinator.in2);
        builder.build_flow_with(coordinator.in1, coordinator.out2, move |values| {
            values.take(inner_key)
        })
    }
}

type Shape<In, S, Out> = BidiShape<(In, S), (In, S), (Result<Out>, S), (Result<Out>, S)>;

struct RetryCoordinator<In, S, Out, F> {
    limit: usize,
    retry_with: Arc<F>,
    _marker: PhantomData<fn(In, S) -> Out>,
}

impl<In, S, Out, F> GraphStage for RetryCoordinator<In, S, Out, F>
where
    In: Send + 'static,
    S: Send + 'static,
    Out: Send + 'static,
    F: Fn(&S) -> Option<Vec<(In, S)>> + Send + Sync + 'static,
{
    type Shape = Shape<In, S, Out>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        BidiShape::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("retry")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = RetryLogic {
            shape: self.shape(),
            limit: self.limit,
            retry_with: Arc::clone(&self.retry_with),
            queue: VecDeque::new(),
            in_flight: 0,
            upstream_done: false,
        };
        Ok((Box::new(logic), NotUsed))
    }

    fn breaks_cycles(&self) -> bool {
        true
    }
}

struct RetryLogic<In, S, Out, F> {
    shape: Shape<In, S, Out>,
    limit: usize,
    retry_with: Arc<F>,
    /// Inputs waiting to re-enter the wrapped flow.
    queue: VecDeque<(In, S)>,
    /// Inputs inside the wrapped flow.
    in_flight: usize,
    upstream_done: bool,
}

impl<In, S, Out, F> RetryLogic<In, S, Out, F>
where
    In: Send + 'static,
    S: Send + 'static,
    Out: Send + 'static,
    F: Fn(&S) -> Option<Vec<(In, S)>> + Send + Sync + 'static,
{
    fn send_inner(&mut self, ctx: &mut StageContext<'_>, element: (In, S)) -> Result<()> {
        self.in_flight += 1;
        ctx.push(self.shape.out1, element)
    }

    fn feed_inner(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if !ctx.is_available(self.shape.out1) {
            return Ok(());
        }
        if let Some(retry) = self.queue.pop_front() {
            return self.send_inner(ctx, retry);
        }
        if !self.upstream_done {
            ctx.try_pull(self.shape.in1)?;
        }
        Ok(())
    }

    fn check_done(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.upstream_done && self.queue.is_empty() && self.in_flight == 0 {
            return ctx.complete_stage();
        }
        Ok(())
    }

    fn on_result(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        let (result, state) = ctx.grab(self.shape.in2)?;
        self.in_flight = self.in_flight.saturating_sub(1);
        if result.is_ok() {
            return ctx.push(self.shape.out2, (result, state));
        }
        let Some(retries) = (self.retry_with)(&state) else {
            return ctx.push(self.shape.out2, (result, state));
        };
        if self.queue.len() + retries.len() > self.limit {
            return ctx.fail_stage(StreamError::buffer_overflow(self.limit));
        }
        debug!("{}: retrying with {} inputs", ctx.stage_name(), retries.len());
        for retry in retries.into_iter().rev() {
            self.queue.push_front(retry);
        }
        self.feed_inner(ctx)?;
        ctx.try_pull(self.shape.in2)
    }
}

impl<In, S, Out, F> StageLogic for RetryLogic<In, S, Out, F>
where
    In: Send + 'static,
    S: Send + 'static,
    Out: Send + 'static,
    F: Fn(&S) -> Option<Vec<(In, S)>> + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, inlet: usize) -> Result<()> {
        if inlet == self.shape.in1.index() {
            let element = ctx.grab(self.shape.in1)?;
            if ctx.is_available(self.shape.out1) && self.queue.is_empty() {
                return self.send_inner(ctx, element);
            }
            self.queue.push_back(element);
            return Ok(());
        }
        self.on_result(ctx)?;
        self.check_done(ctx)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, outlet: usize) -> Result<()> {
        if outlet == self.shape.out1.index() {
            return self.feed_inner(ctx);
        }
        ctx.try_pull(self.shape.in2)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, inlet: usize) -> Result<()> {
        if inlet == self.shape.in1.index() {
            self.upstream_done = true;
            return self.check_done(ctx);
        }
        ctx.complete_stage()
    }
}

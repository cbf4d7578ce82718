// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Operators that run a future per element.
//!
//! The futures run on the runtime and their outputs come back through
//! `on_async`, so failures never pass through the interpreter's own supervision.
//! Each stage asks its decider directly: `Stop` fails the stage, `Resume` drops
//! the failed element and `Restart` does the same (for `fold_async` it also
//! resets the accumulator).

use super::flow_stage;
use crate::context::StageContext;
use crate::dsl::Flow;
use crate::logging::debug;
use crate::logic::{downcast_event, StageLogic};
use crate::shape::FlowShape;
use sluice_core::supervision::Directive;
use sluice_core::{Result, StreamError};
use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

fn keep_going_after(ctx: &mut StageContext<'_>, error: StreamError) -> Result<bool> {
    match ctx.supervision_directive(&error) {
        Directive::Stop => {
            ctx.fail_stage(error)?;
            Ok(false)
        }
        directive => {
            debug!(
                "{}: {:?} after asynchronous failure: {}",
                ctx.stage_name(),
                directive,
                error
            );
            Ok(true)
        }
    }
}

struct MapAsyncLogic<I, O, F> {
    shape: FlowShape<I, O>,
    parallelism: usize,
    f: Arc<F>,
    next_id: u64,
    in_flight: VecDeque<(u64, Option<Result<O>>)>,
}

impl<I, O, F, Fut> MapAsyncLogic<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    /// Emit completed results from the head of the queue, in input order.
    fn drain(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        loop {
            match self.in_flight.front() {
                Some((_, Some(Err(_)))) => {
                    if let Some((_, Some(Err(error)))) = self.in_flight.pop_front() {
                        if !keep_going_after(ctx, error)? {
                            return Ok(());
                        }
                    }
                }
                Some((_, Some(Ok(_)))) if ctx.is_available(self.shape.outlet) => {
                    if let Some((_, Some(Ok(element)))) = self.in_flight.pop_front() {
                        ctx.push(self.shape.outlet, element)?;
                    }
                }
                _ => break,
            }
        }
        self.continue_or_finish(ctx)
    }

    fn continue_or_finish(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if ctx.is_closed(self.shape.inlet) {
            if self.in_flight.is_empty() {
                ctx.complete_stage()?;
            }
            return Ok(());
        }
        if self.in_flight.len() < self.parallelism {
            ctx.try_pull(self.shape.inlet)?;
        }
        Ok(())
    }
}

impl<I, O, F, Fut> StageLogic for MapAsyncLogic<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        let id = self.next_id;
        self.next_id += 1;
        let future = (self.f)(element);
        ctx.run_future(async move { (id, future.await) });
        self.in_flight.push_back((id, None));
        self.continue_or_finish(ctx)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        self.drain(ctx)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        if self.in_flight.is_empty() {
            ctx.complete_stage()?;
        }
        Ok(())
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        let (id, result) = downcast_event::<(u64, Result<O>)>(event)?;
        if let Some(slot) = self.in_flight.iter_mut().find(|(slot_id, _)| *slot_id == id) {
            slot.1 = Some(result);
        }
        self.drain(ctx)
    }
}

pub(crate) fn map_async<I, O, F, Fut>(parallelism: usize, f: F) -> Flow<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    let parallelism = parallelism.max(1);
    let f = Arc::new(f);
    flow_stage("map_async", move || MapAsyncLogic {
        shape: FlowShape::<I, O>::new(),
        parallelism,
        f: Arc::clone(&f),
        next_id: 0,
        in_flight: VecDeque::with_capacity(parallelism),
    })
}

struct MapAsyncUnorderedLogic<I, O, F> {
    shape: FlowShape<I, O>,
    parallelism: usize,
    f: Arc<F>,
    in_flight: usize,
    ready: VecDeque<O>,
}

impl<I, O, F, Fut> MapAsyncUnorderedLogic<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    fn continue_or_finish(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if ctx.is_closed(self.shape.inlet) {
            if self.in_flight == 0 && self.ready.is_empty() {
                ctx.complete_stage()?;
            }
            return Ok(());
        }
        if self.in_flight + self.ready.len() < self.parallelism {
            ctx.try_pull(self.shape.inlet)?;
        }
        Ok(())
    }
}

impl<I, O, F, Fut> StageLogic for MapAsyncUnorderedLogic<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        ctx.run_future((self.f)(element));
        self.in_flight += 1;
        self.continue_or_finish(ctx)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        if let Some(element) = self.ready.pop_front() {
            ctx.push(self.shape.outlet, element)?;
        }
        self.continue_or_finish(ctx)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        self.continue_or_finish(ctx)
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        let result = downcast_event::<Result<O>>(event)?;
        self.in_flight = self.in_flight.saturating_sub(1);
        match result {
            Ok(element) if ctx.is_available(self.shape.outlet) => {
                ctx.push(self.shape.outlet, element)?;
            }
            Ok(element) => self.ready.push_back(element),
            Err(error) => {
                if !keep_going_after(ctx, error)? {
                    return Ok(());
                }
            }
        }
        self.continue_or_finish(ctx)
    }
}

pub(crate) fn map_async_unordered<I, O, F, Fut>(parallelism: usize, f: F) -> Flow<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    let parallelism = parallelism.max(1);
    let f = Arc::new(f);
    flow_stage("map_async_unordered", move || MapAsyncUnorderedLogic {
        shape: FlowShape::<I, O>::new(),
        parallelism,
        f: Arc::clone(&f),
        in_flight: 0,
        ready: VecDeque::with_capacity(parallelism),
    })
}

struct FoldAsyncLogic<I, S, F> {
    shape: FlowShape<I, S>,
    seed: S,
    state: S,
    f: Arc<F>,
    in_flight: bool,
}

impl<I, S, F, Fut> FoldAsyncLogic<I, S, F>
where
    I: Send + 'static,
    S: Clone + Send + 'static,
    F: Fn(S, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<S>> + Send + 'static,
{
    fn continue_or_finish(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if ctx.is_closed(self.shape.inlet) {
            ctx.emit(self.shape.outlet, self.state.clone())?;
            return ctx.complete_stage();
        }
        ctx.try_pull(self.shape.inlet)
    }
}

impl<I, S, F, Fut> StageLogic for FoldAsyncLogic<I, S, F>
where
    I: Send + 'static,
    S: Clone + Send + 'static,
    F: Fn(S, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<S>> + Send + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        self.in_flight = true;
        ctx.run_future((self.f)(self.state.clone(), element));
        Ok(())
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        if !self.in_flight {
            ctx.try_pull(self.shape.inlet)?;
        }
        Ok(())
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        if !self.in_flight {
            ctx.emit(self.shape.outlet, self.state.clone())?;
            ctx.complete_stage()?;
        }
        Ok(())
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        self.in_flight = false;
        match downcast_event::<Result<S>>(event)? {
            Ok(state) => self.state = state,
            Err(error) => match ctx.supervision_directive(&error) {
                Directive::Stop => return ctx.fail_stage(error),
                Directive::Resume => {}
                Directive::Restart => self.state = self.seed.clone(),
            },
        }
        self.continue_or_finish(ctx)
    }
}

pub(crate) fn fold_async<I, S, F, Fut>(seed: S, f: F) -> Flow<I, S>
where
    I: Send + 'static,
    S: Clone + Send + Sync + 'static,
    F: Fn(S, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<S>> + Send + 'static,
{
    let f = Arc::new(f);
    flow_stage("fold_async", move || FoldAsyncLogic {
        shape: FlowShape::<I, S>::new(),
        seed: seed.clone(),
        state: seed.clone(),
        f: Arc::clone(&f),
        in_flight: false,
    })
}

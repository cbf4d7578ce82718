// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Flattening a stream of sources.
//!
//! Each inner source is materialized on the stage's materializer against an
//! internal sink that forwards its elements back as async events. Every inner
//! stream has at most one element outstanding, so flattening stays
//! backpressured end to end.

use super::{flow_stage, sink_stage};
use crate::async_callback::{AsyncCallback, CallbackSlot};
use crate::context::StageContext;
use crate::dsl::{Flow, Sink, Source};
use crate::logging::debug;
use crate::logic::{downcast_event, StageLogic};
use crate::shape::{FlowShape, SinkShape};
use sluice_core::{Attributes, NotUsed, Result, StreamError};
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Sent by the flattening stage to one inner sink.
enum InnerCommand {
    Pull,
    Cancel,
}

/// Sent by an inner sink to the flattening stage.
enum InnerEvent<T> {
    Element(u64, T),
    Completed(u64),
    Failed(u64, StreamError),
}

struct InnerSinkLogic<T> {
    shape: SinkShape<T>,
    id: u64,
    slot: CallbackSlot<InnerCommand>,
    parent: AsyncCallback<InnerEvent<T>>,
    finished: bool,
}

impl<T: Send + 'static> StageLogic for InnerSinkLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.slot.bind(ctx.async_callback());
        Ok(())
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        if self.parent.invoke(InnerEvent::Element(self.id, element)) {
            return Ok(());
        }
        self.finished = true;
        ctx.complete_stage()
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        self.finished = true;
        self.parent.invoke(InnerEvent::Completed(self.id));
        ctx.complete_stage()
    }

    fn on_upstream_failure(
        &mut self,
        ctx: &mut StageContext<'_>,
        _inlet: usize,
        error: StreamError,
    ) -> Result<()> {
        self.finished = true;
        self.parent.invoke(InnerEvent::Failed(self.id, error));
        ctx.complete_stage()
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        match downcast_event::<InnerCommand>(event)? {
            InnerCommand::Pull => ctx.try_pull(self.shape.inlet),
            InnerCommand::Cancel => {
                self.finished = true;
                ctx.complete_stage()
            }
        }
    }

    fn post_stop(&mut self, abort_cause: Option<&StreamError>) {
        self.slot.close();
        if !self.finished {
            let error = abort_cause.cloned().unwrap_or_else(|| {
                StreamError::abrupt_termination("inner stream stopped unexpectedly")
            });
            self.parent.invoke(InnerEvent::Failed(self.id, error));
        }
    }
}

fn inner_sink<T: Send + 'static>(
    id: u64,
    slot: CallbackSlot<InnerCommand>,
    parent: AsyncCallback<InnerEvent<T>>,
) -> Sink<T> {
    sink_stage("flatten_inner", move |_: &Attributes| {
        let logic = InnerSinkLogic {
            shape: SinkShape::<T>::new(),
            id,
            slot: slot.clone(),
            parent: parent.clone(),
            finished: false,
        };
        Ok((Box::new(logic) as Box<dyn StageLogic>, NotUsed))
    })
}

struct FlattenLogic<I, O, M, F> {
    shape: FlowShape<I, O>,
    breadth: usize,
    f: Arc<F>,
    next_id: u64,
    inners: HashMap<u64, CallbackSlot<InnerCommand>>,
    /// Elements received from inner streams in arrival order.
    ready: VecDeque<(u64, O)>,
    upstream_done: bool,
    _mat: std::marker::PhantomData<fn() -> M>,
}

impl<I, O, M, F> FlattenLogic<I, O, M, F>
where
    I: Send + 'static,
    O: Send + 'static,
    M: Send + 'static,
    F: Fn(I) -> Source<O, M> + Send + Sync + 'static,
{
    fn new(breadth: usize, f: Arc<F>) -> Self {
        Self {
            shape: FlowShape::new(),
            breadth: breadth.max(1),
            f,
            next_id: 0,
            inners: HashMap::new(),
            ready: VecDeque::new(),
            upstream_done: false,
            _mat: std::marker::PhantomData,
        }
    }

    fn start_inner(&mut self, ctx: &mut StageContext<'_>, source: Source<O, M>) -> Result<()> {
        let id = self.next_id;
        self.next_id += 1;
        let slot = CallbackSlot::new();
        let sink = inner_sink(id, slot.clone(), ctx.async_callback());
        let materializer = ctx.materializer().clone();
        materializer.materialize(&source.to(sink))?;
        let _ = slot.invoke(InnerCommand::Pull);
        self.inners.insert(id, slot);
        Ok(())
    }

    fn request_next(&self, id: u64) {
        if let Some(slot) = self.inners.get(&id) {
            let _ = slot.invoke(InnerCommand::Pull);
        }
    }

    fn pull_upstream(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.inners.len() < self.breadth {
            ctx.try_pull(self.shape.inlet)?;
        }
        Ok(())
    }

    fn check_done(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.upstream_done && self.inners.is_empty() && self.ready.is_empty() {
            return ctx.complete_stage();
        }
        Ok(())
    }

    fn cancel_inners(&mut self) {
        for (_, slot) in self.inners.drain() {
            let _ = slot.invoke(InnerCommand::Cancel);
        }
    }
}

impl<I, O, M, F> StageLogic for FlattenLogic<I, O, M, F>
where
    I: Send + 'static,
    O: Send + 'static,
    M: Send + 'static,
    F: Fn(I) -> Source<O, M> + Send + Sync + 'static,
{
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        ctx.set_keep_going(true);
        ctx.pull(self.shape.inlet)
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        let source = (self.f)(element);
        self.start_inner(ctx, source)?;
        self.pull_upstream(ctx)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        if let Some((id, element)) = self.ready.pop_front() {
            ctx.push(self.shape.outlet, element)?;
            self.request_next(id);
        }
        self.check_done(ctx)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        self.upstream_done = true;
        self.check_done(ctx)
    }

    fn on_upstream_failure(
        &mut self,
        ctx: &mut StageContext<'_>,
        _inlet: usize,
        error: StreamError,
    ) -> Result<()> {
        self.cancel_inners();
        ctx.fail_stage(error)
    }

    fn on_downstream_finish(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        self.cancel_inners();
        ctx.complete_stage()
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        match downcast_event::<InnerEvent<O>>(event)? {
            InnerEvent::Element(id, element) => {
                if !self.inners.contains_key(&id) {
                    return Ok(());
                }
                if self.ready.is_empty() && ctx.is_available(self.shape.outlet) {
                    ctx.push(self.shape.outlet, element)?;
                    self.request_next(id);
                } else {
                    self.ready.push_back((id, element));
                }
                Ok(())
            }
            InnerEvent::Completed(id) => {
                if self.inners.remove(&id).is_some() {
                    self.pull_upstream(ctx)?;
                }
                self.check_done(ctx)
            }
            InnerEvent::Failed(id, error) => {
                if self.inners.remove(&id).is_none() {
                    return Ok(());
                }
                debug!("{}: inner stream {} failed: {}", ctx.stage_name(), id, error);
                self.cancel_inners();
                ctx.fail_stage(error)
            }
        }
    }

    fn post_stop(&mut self, _abort_cause: Option<&StreamError>) {
        self.cancel_inners();
    }
}

/// Run up to `breadth` inner sources at once and emit their elements as they
/// arrive.
pub(crate) fn flat_map_merge<I, O, M, F>(breadth: usize, f: F) -> Flow<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
    M: Send + 'static,
    F: Fn(I) -> Source<O, M> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    flow_stage("flat_map_merge", move || FlattenLogic::new(breadth, Arc::clone(&f)))
}

/// Run inner sources one after another, in upstream order.
pub(crate) fn flat_map_concat<I, O, M, F>(f: F) -> Flow<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
    M: Send + 'static,
    F: Fn(I) -> Source<O, M> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    flow_stage("flat_map_concat", move || FlattenLogic::new(1, Arc::clone(&f)))
}

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Stateful operators that accumulate elements.
//!
//! State is rebuilt from the seed on a `Restart` directive and kept on `Resume`.

use super::flow_stage;
use crate::context::StageContext;
use crate::dsl::Flow;
use crate::logic::StageLogic;
use crate::shape::FlowShape;
use sluice_core::{Result, StreamError};
use std::collections::VecDeque;
use std::sync::Arc;

struct ScanLogic<I, S, F> {
    shape: FlowShape<I, S>,
    seed: S,
    state: S,
    seed_emitted: bool,
    f: Arc<F>,
}

impl<I, S, F> StageLogic for ScanLogic<I, S, F>
where
    I: Send + 'static,
    S: Clone + Send + 'static,
    F: Fn(&S, I) -> Result<S> + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        self.state = (self.f)(&self.state, element)?;
        ctx.push(self.shape.outlet, self.state.clone())
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        if self.seed_emitted {
            return ctx.pull(self.shape.inlet);
        }
        self.seed_emitted = true;
        ctx.push(self.shape.outlet, self.state.clone())
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        if !self.seed_emitted {
            self.seed_emitted = true;
            ctx.emit(self.shape.outlet, self.state.clone())?;
        }
        ctx.complete_stage()
    }

    fn restart(&mut self) {
        self.state = self.seed.clone();
    }
}

pub(crate) fn try_scan<I, S, F>(seed: S, f: F) -> Flow<I, S>
where
    I: Send + 'static,
    S: Clone + Send + Sync + 'static,
    F: Fn(&S, I) -> Result<S> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    flow_stage("scan", move || ScanLogic {
        shape: FlowShape::<I, S>::new(),
        seed: seed.clone(),
        state: seed.clone(),
        seed_emitted: false,
        f: Arc::clone(&f),
    })
}

struct FoldLogic<I, S, F> {
    shape: FlowShape<I, S>,
    seed: S,
    state: S,
    f: Arc<F>,
}

impl<I, S, F> StageLogic for FoldLogic<I, S, F>
where
    I: Send + 'static,
    S: Clone + Send + 'static,
    F: Fn(S, I) -> Result<S> + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        self.state = (self.f)(self.state.clone(), element)?;
        ctx.pull(self.shape.inlet)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        ctx.emit(self.shape.outlet, self.state.clone())?;
        ctx.complete_stage()
    }

    fn restart(&mut self) {
        self.state = self.seed.clone();
    }
}

pub(crate) fn try_fold<I, S, F>(seed: S, f: F) -> Flow<I, S>
where
    I: Send + 'static,
    S: Clone + Send + Sync + 'static,
    F: Fn(S, I) -> Result<S> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    flow_stage("fold", move || FoldLogic {
        shape: FlowShape::<I, S>::new(),
        seed: seed.clone(),
        state: seed.clone(),
        f: Arc::clone(&f),
    })
}

struct ReduceLogic<T, F> {
    shape: FlowShape<T, T>,
    state: Option<T>,
    f: Arc<F>,
}

impl<T, F> StageLogic for ReduceLogic<T, F>
where
    T: Clone + Send + 'static,
    F: Fn(T, T) -> T + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        self.state = Some(match &self.state {
            Some(acc) => (self.f)(acc.clone(), element),
            None => element,
        });
        ctx.pull(self.shape.inlet)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        match self.state.take() {
            Some(result) => {
                ctx.emit(self.shape.outlet, result)?;
                ctx.complete_stage()
            }
            None => ctx.fail_stage(StreamError::empty_stream("reduce over an empty stream")),
        }
    }

    fn restart(&mut self) {
        self.state = None;
    }
}

pub(crate) fn reduce<T, F>(f: F) -> Flow<T, T>
where
    T: Clone + Send + 'static,
    F: Fn(T, T) -> T + Send + Sync + 'static,
{
    let f = Arc::new(f);
    flow_stage("reduce", move || ReduceLogic {
        shape: FlowShape::<T, T>::new(),
        state: None,
        f: Arc::clone(&f),
    })
}

struct GroupedLogic<T> {
    shape: FlowShape<T, Vec<T>>,
    size: usize,
    buffer: Vec<T>,
}

impl<T: Send + 'static> StageLogic for GroupedLogic<T> {
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        self.buffer.push(element);
        if self.buffer.len() >= self.size {
            let group = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.size));
            return ctx.push(self.shape.outlet, group);
        }
        ctx.pull(self.shape.inlet)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        if !self.buffer.is_empty() {
            let group = std::mem::take(&mut self.buffer);
            ctx.emit(self.shape.outlet, group)?;
        }
        ctx.complete_stage()
    }

    fn restart(&mut self) {
        self.buffer.clear();
    }
}

pub(crate) fn grouped<T: Send + 'static>(size: usize) -> Flow<T, Vec<T>> {
    let size = size.max(1);
    flow_stage("grouped", move || GroupedLogic {
        shape: FlowShape::<T, Vec<T>>::new(),
        size,
        buffer: Vec::with_capacity(size),
    })
}

struct SlidingLogic<T> {
    shape: FlowShape<T, Vec<T>>,
    size: usize,
    step: usize,
    window: VecDeque<T>,
    to_skip: usize,
    emitted: bool,
}

impl<T: Clone + Send + 'static> StageLogic for SlidingLogic<T> {
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        if self.to_skip > 0 {
            self.to_skip -= 1;
            return ctx.pull(self.shape.inlet);
        }
        self.window.push_back(element);
        if self.window.len() < self.size {
            return ctx.pull(self.shape.inlet);
        }

        let full: Vec<T> = self.window.iter().cloned().collect();
        self.emitted = true;
        if self.step >= self.size {
            self.window.clear();
            self.to_skip = self.step - self.size;
        } else {
            self.window.drain(..self.step);
        }
        ctx.push(self.shape.outlet, full)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let already_seen = if self.step < self.size {
            self.size - self.step
        } else {
            0
        };
        // A trailing partial window is emitted only if it holds unseen elements.
        if !self.window.is_empty() && (!self.emitted || self.window.len() > already_seen) {
            let partial: Vec<T> = self.window.drain(..).collect();
            ctx.emit(self.shape.outlet, partial)?;
        }
        ctx.complete_stage()
    }

    fn restart(&mut self) {
        self.window.clear();
        self.to_skip = 0;
        self.emitted = false;
    }
}

pub(crate) fn sliding<T: Clone + Send + 'static>(size: usize, step: usize) -> Flow<T, Vec<T>> {
    let size = size.max(1);
    let step = step.max(1);
    flow_stage("sliding", move || SlidingLogic {
        shape: FlowShape::<T, Vec<T>>::new(),
        size,
        step,
        window: VecDeque::with_capacity(size),
        to_skip: 0,
        emitted: false,
    })
}

struct IntersperseLogic<T> {
    shape: FlowShape<T, T>,
    start: Option<T>,
    separator: T,
    end: Option<T>,
    first: bool,
}

impl<T: Clone + Send + 'static> StageLogic for IntersperseLogic<T> {
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        if self.first {
            self.first = false;
            if let Some(start) = self.start.clone() {
                ctx.emit(self.shape.outlet, start)?;
            }
        } else {
            ctx.emit(self.shape.outlet, self.separator.clone())?;
        }
        ctx.emit(self.shape.outlet, element)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        if self.first {
            if let Some(start) = self.start.clone() {
                ctx.emit(self.shape.outlet, start)?;
            }
        }
        if let Some(end) = self.end.clone() {
            ctx.emit(self.shape.outlet, end)?;
        }
        ctx.complete_stage()
    }
}

pub(crate) fn intersperse<T>(start: Option<T>, separator: T, end: Option<T>) -> Flow<T, T>
where
    T: Clone + Send + Sync + 'static,
{
    flow_stage("intersperse", move || IntersperseLogic {
        shape: FlowShape::<T, T>::new(),
        start: start.clone(),
        separator: separator.clone(),
        end: end.clone(),
        first: true,
    })
}

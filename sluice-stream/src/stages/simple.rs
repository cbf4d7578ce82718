// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Element-wise operators.

use super::flow_stage;
use crate::context::StageContext;
use crate::dsl::Flow;
use crate::logging::log_at;
use crate::logic::StageLogic;
use crate::shape::FlowShape;
use sluice_core::{LogLevel, Result, StreamError};
use std::fmt::Debug;
use std::sync::Arc;

struct IdentityLogic<T> {
    shape: FlowShape<T, T>,
}

impl<T: Send + 'static> StageLogic for IdentityLogic<T> {
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        ctx.push(self.shape.outlet, element)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }
}

pub(crate) fn identity<T: Send + 'static>() -> Flow<T, T> {
    flow_stage("identity", || IdentityLogic {
        shape: FlowShape::<T, T>::new(),
    })
}

struct MapLogic<I, O, F> {
    shape: FlowShape<I, O>,
    f: Arc<F>,
}

impl<I, O, F> StageLogic for MapLogic<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> O + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        ctx.push(self.shape.outlet, (self.f)(element))
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }
}

pub(crate) fn map<I, O, F>(f: F) -> Flow<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> O + Send + Sync + 'static,
{
    let f = Arc::new(f);
    flow_stage("map", move || MapLogic {
        shape: FlowShape::<I, O>::new(),
        f: Arc::clone(&f),
    })
}

struct TryMapLogic<I, O, F> {
    shape: FlowShape<I, O>,
    f: Arc<F>,
}

impl<I, O, F> StageLogic for TryMapLogic<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Result<O> + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        let mapped = (self.f)(element)?;
        ctx.push(self.shape.outlet, mapped)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }
}

pub(crate) fn try_map<I, O, F>(f: F) -> Flow<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Result<O> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    flow_stage("try_map", move || TryMapLogic {
        shape: FlowShape::<I, O>::new(),
        f: Arc::clone(&f),
    })
}

struct FilterLogic<T, P> {
    shape: FlowShape<T, T>,
    predicate: Arc<P>,
}

impl<T, P> StageLogic for FilterLogic<T, P>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        if (self.predicate)(&element) {
            ctx.push(self.shape.outlet, element)
        } else {
            ctx.pull(self.shape.inlet)
        }
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }
}

pub(crate) fn filter<T, P>(predicate: P) -> Flow<T, T>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    flow_stage("filter", move || FilterLogic {
        shape: FlowShape::<T, T>::new(),
        predicate: Arc::clone(&predicate),
    })
}

struct FilterMapLogic<I, O, F> {
    shape: FlowShape<I, O>,
    f: Arc<F>,
}

impl<I, O, F> StageLogic for FilterMapLogic<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Option<O> + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        match (self.f)(element) {
            Some(mapped) => ctx.push(self.shape.outlet, mapped),
            None => ctx.pull(self.shape.inlet),
        }
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }
}

pub(crate) fn filter_map<I, O, F>(f: F) -> Flow<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Option<O> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    flow_stage("filter_map", move || FilterMapLogic {
        shape: FlowShape::<I, O>::new(),
        f: Arc::clone(&f),
    })
}

struct MapConcatLogic<I, O, F> {
    shape: FlowShape<I, O>,
    f: Arc<F>,
}

impl<I, O, It, F> StageLogic for MapConcatLogic<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    It: IntoIterator<Item = O>,
    F: Fn(I) -> It + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        ctx.emit_multiple(self.shape.outlet, (self.f)(element))?;
        // Nothing was produced: the pull that led here is still unanswered.
        if ctx.is_available(self.shape.outlet) {
            ctx.pull(self.shape.inlet)?;
        }
        Ok(())
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }
}

pub(crate) fn map_concat<I, O, It, F>(f: F) -> Flow<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
    It: IntoIterator<Item = O> + 'static,
    F: Fn(I) -> It + Send + Sync + 'static,
{
    let f = Arc::new(f);
    flow_stage("map_concat", move || MapConcatLogic {
        shape: FlowShape::<I, O>::new(),
        f: Arc::clone(&f),
    })
}

struct RecoverLogic<T, F> {
    shape: FlowShape<T, T>,
    f: Arc<F>,
}

impl<T, F> StageLogic for RecoverLogic<T, F>
where
    T: Send + 'static,
    F: Fn(&StreamError) -> Option<T> + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        ctx.push(self.shape.outlet, element)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn on_upstream_failure(
        &mut self,
        ctx: &mut StageContext<'_>,
        _inlet: usize,
        error: StreamError,
    ) -> Result<()> {
        match (self.f)(&error) {
            Some(element) => {
                ctx.emit(self.shape.outlet, element)?;
                ctx.complete_stage()
            }
            None => ctx.fail_stage(error),
        }
    }
}

pub(crate) fn recover<T, F>(f: F) -> Flow<T, T>
where
    T: Send + 'static,
    F: Fn(&StreamError) -> Option<T> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    flow_stage("recover", move || RecoverLogic {
        shape: FlowShape::<T, T>::new(),
        f: Arc::clone(&f),
    })
}

struct MapErrorLogic<T, F> {
    shape: FlowShape<T, T>,
    f: Arc<F>,
}

impl<T, F> StageLogic for MapErrorLogic<T, F>
where
    T: Send + 'static,
    F: Fn(StreamError) -> StreamError + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        ctx.push(self.shape.outlet, element)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn on_upstream_failure(
        &mut self,
        ctx: &mut StageContext<'_>,
        _inlet: usize,
        error: StreamError,
    ) -> Result<()> {
        ctx.fail_stage((self.f)(error))
    }
}

pub(crate) fn map_error<T, F>(f: F) -> Flow<T, T>
where
    T: Send + 'static,
    F: Fn(StreamError) -> StreamError + Send + Sync + 'static,
{
    let f = Arc::new(f);
    flow_stage("map_error", move || MapErrorLogic {
        shape: FlowShape::<T, T>::new(),
        f: Arc::clone(&f),
    })
}

struct LogLogic<T> {
    shape: FlowShape<T, T>,
    name: String,
    levels: Option<(LogLevel, LogLevel, LogLevel)>,
}

impl<T> LogLogic<T> {
    fn levels(&mut self, ctx: &StageContext<'_>) -> (LogLevel, LogLevel, LogLevel) {
        *self.levels.get_or_insert_with(|| {
            ctx.attributes().get_log_levels().unwrap_or((
                LogLevel::Debug,
                LogLevel::Debug,
                LogLevel::Error,
            ))
        })
    }
}

impl<T: Debug + Send + 'static> StageLogic for LogLogic<T> {
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        let (level, _, _) = self.levels(ctx);
        log_at(level, format_args!("[{}] element: {:?}", self.name, element));
        ctx.push(self.shape.outlet, element)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let (_, level, _) = self.levels(ctx);
        log_at(level, format_args!("[{}] upstream finished", self.name));
        ctx.complete_stage()
    }

    fn on_upstream_failure(
        &mut self,
        ctx: &mut StageContext<'_>,
        _inlet: usize,
        error: StreamError,
    ) -> Result<()> {
        let (_, _, level) = self.levels(ctx);
        log_at(level, format_args!("[{}] upstream failed: {}", self.name, error));
        ctx.fail_stage(error)
    }

    fn on_downstream_finish(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        let (_, level, _) = self.levels(ctx);
        log_at(level, format_args!("[{}] downstream cancelled", self.name));
        ctx.complete_stage()
    }
}

pub(crate) fn log<T: Debug + Send + 'static>(name: impl Into<String>) -> Flow<T, T> {
    let name = name.into();
    flow_stage("log", move || LogLogic {
        shape: FlowShape::<T, T>::new(),
        name: name.clone(),
        levels: None,
    })
}


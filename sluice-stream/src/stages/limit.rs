// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use super::flow_stage;
use crate::context::StageContext;
use crate::dsl::Flow;
use crate::logic::StageLogic;
use crate::shape::FlowShape;
use sluice_core::Result;
use std::sync::Arc;

struct TakeLogic<T> {
    shape: FlowShape<T, T>,
    limit: u64,
    remaining: u64,
}

impl<T: Send + 'static> StageLogic for TakeLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.remaining == 0 {
            ctx.complete_stage()?;
        }
        Ok(())
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        self.remaining = self.remaining.saturating_sub(1);
        ctx.push(self.shape.outlet, element)?;
        if self.remaining == 0 {
            ctx.complete_stage()?;
        }
        Ok(())
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn restart(&mut self) {
        self.remaining = self.limit;
    }
}

pub(crate) fn take<T: Send + 'static>(n: u64) -> Flow<T, T> {
    flow_stage("take", move || TakeLogic {
        shape: FlowShape::<T, T>::new(),
        limit: n,
        remaining: n,
    })
}

struct TakeWhileLogic<T, P> {
    shape: FlowShape<T, T>,
    predicate: Arc<P>,
    inclusive: bool,
}

impl<T, P> StageLogic for TakeWhileLogic<T, P>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        if (self.predicate)(&element) {
            return ctx.push(self.shape.outlet, element);
        }
        if self.inclusive {
            ctx.push(self.shape.outlet, element)?;
        }
        ctx.complete_stage()
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }
}

pub(crate) fn take_while<T, P>(predicate: P, inclusive: bool) -> Flow<T, T>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    flow_stage("take_while", move || TakeWhileLogic {
        shape: FlowShape::<T, T>::new(),
        predicate: Arc::clone(&predicate),
        inclusive,
    })
}

struct SkipLogic<T> {
    shape: FlowShape<T, T>,
    count: u64,
    remaining: u64,
}

impl<T: Send + 'static> StageLogic for SkipLogic<T> {
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        if self.remaining > 0 {
            self.remaining -= 1;
            return ctx.pull(self.shape.inlet);
        }
        ctx.push(self.shape.outlet, element)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn restart(&mut self) {
        self.remaining = self.count;
    }
}

pub(crate) fn skip<T: Send + 'static>(n: u64) -> Flow<T, T> {
    flow_stage("skip", move || SkipLogic {
        shape: FlowShape::<T, T>::new(),
        count: n,
        remaining: n,
    })
}

struct SkipWhileLogic<T, P> {
    shape: FlowShape<T, T>,
    predicate: Arc<P>,
    skipping: bool,
}

impl<T, P> StageLogic for SkipWhileLogic<T, P>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        if self.skipping && (self.predicate)(&element) {
            return ctx.pull(self.shape.inlet);
        }
        self.skipping = false;
        ctx.push(self.shape.outlet, element)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn restart(&mut self) {
        self.skipping = true;
    }
}

pub(crate) fn skip_while<T, P>(predicate: P) -> Flow<T, T>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    flow_stage("skip_while", move || SkipWhileLogic {
        shape: FlowShape::<T, T>::new(),
        predicate: Arc::clone(&predicate),
        skipping: true,
    })
}

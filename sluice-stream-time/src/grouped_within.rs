// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::{Attributes, NotUsed, Result};
use sluice_stream::{FlowShape, GraphStage, StageContext, StageLogic, TimerKey};
use std::marker::PhantomData;
use std::mem;
use std::time::Duration;

const GROUP_TIMER: TimerKey = 0;

/// Chunk elements into groups of at most `max` elements, closing a group
/// early when `interval` passes without one being emitted.
///
/// Groups are never empty. A closed group waiting for demand stops upstream
/// pulls, so the stage holds at most one closed group plus the element already
/// requested.
pub struct GroupedWithin<T> {
    max: usize,
    interval: Duration,
    _marker: PhantomData<fn(T)>,
}

impl<T> GroupedWithin<T> {
    /// Groups of up to `max` elements (at least one), flushed every `interval`.
    #[must_use]
    pub fn new(max: usize, interval: Duration) -> Self {
        Self {
            max: max.max(1),
            interval,
            _marker: PhantomData,
        }
    }
}

impl<T: Send + 'static> GraphStage for GroupedWithin<T> {
    type Shape = FlowShape<T, Vec<T>>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        FlowShape::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("grouped_within")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = GroupedWithinLogic {
            shape: self.shape(),
            max: self.max,
            interval: self.interval,
            buffer: Vec::with_capacity(self.max),
            ready: None,
        };
        Ok((Box::new(logic), NotUsed))
    }
}

struct GroupedWithinLogic<T> {
    shape: FlowShape<T, Vec<T>>,
    max: usize,
    interval: Duration,
    buffer: Vec<T>,
    /// Closed group waiting for downstream demand.
    ready: Option<Vec<T>>,
}

impl<T: Send + 'static> GroupedWithinLogic<T> {
    fn close_group(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        let group = mem::replace(&mut self.buffer, Vec::with_capacity(self.max));
        if ctx.is_available(self.shape.outlet) {
            ctx.push(self.shape.outlet, group)?;
            ctx.schedule_repeatedly(GROUP_TIMER, self.interval, self.interval);
        } else {
            self.ready = Some(group);
        }
        Ok(())
    }

    fn pull_unless_blocked(&self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.ready.is_none() && !ctx.has_been_pulled(self.shape.inlet) {
            ctx.try_pull(self.shape.inlet)?;
        }
        Ok(())
    }
}

impl<T: Send + 'static> StageLogic for GroupedWithinLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        ctx.schedule_repeatedly(GROUP_TIMER, self.interval, self.interval);
        ctx.pull(self.shape.inlet)
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        self.buffer.push(element);
        if self.ready.is_none() && self.buffer.len() >= self.max {
            self.close_group(ctx)?;
        }
        self.pull_unless_blocked(ctx)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        if let Some(group) = self.ready.take() {
            ctx.push(self.shape.outlet, group)?;
            ctx.schedule_repeatedly(GROUP_TIMER, self.interval, self.interval);
            if self.buffer.len() >= self.max {
                self.close_group(ctx)?;
            }
        }
        self.pull_unless_blocked(ctx)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let mut rest = Vec::with_capacity(2);
        rest.extend(self.ready.take());
        if !self.buffer.is_empty() {
            rest.push(mem::take(&mut self.buffer));
        }
        ctx.emit_multiple(self.shape.outlet, rest)?;
        ctx.complete_stage()
    }

    fn on_timer(&mut self, ctx: &mut StageContext<'_>, _key: TimerKey) -> Result<()> {
        if self.ready.is_some() || self.buffer.is_empty() {
            return Ok(());
        }
        self.close_group(ctx)?;
        self.pull_unless_blocked(ctx)
    }

    fn restart(&mut self) {
        self.buffer.clear();
    }
}

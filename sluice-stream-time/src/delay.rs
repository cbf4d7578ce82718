// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::{Attributes, NotUsed, Result};
use sluice_runtime::timer::Timer;
use sluice_runtime::DefaultTimer;
use sluice_stream::{FlowShape, GraphStage, StageContext, StageLogic, TimerKey};
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::time::Duration;

const DUE_TIMER: TimerKey = 0;

/// Capacity used when no input buffer attribute is in effect.
const DEFAULT_CAPACITY: usize = 16;

type Instant = <DefaultTimer as Timer>::Instant;

/// Shift every element by a fixed delay, keeping order.
///
/// Up to the stage's maximum input buffer elements wait at once; beyond that
/// upstream is backpressured.
pub struct Delay<T> {
    delay: Duration,
    _marker: PhantomData<fn(T)>,
}

impl<T> Delay<T> {
    /// Delay elements by `delay`.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            _marker: PhantomData,
        }
    }
}

impl<T: Send + 'static> GraphStage for Delay<T> {
    type Shape = FlowShape<T, T>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        FlowShape::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("delay")
    }

    fn create_logic(&self, attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let capacity = attributes
            .get_input_buffer()
            .map_or(DEFAULT_CAPACITY, |(_, max)| max)
            .max(1);
        let logic = DelayLogic {
            shape: self.shape(),
            delay: self.delay,
            capacity,
            timer: DefaultTimer::default(),
            queue: VecDeque::with_capacity(capacity),
            upstream_done: false,
        };
        Ok((Box::new(logic), NotUsed))
    }
}

struct DelayLogic<T> {
    shape: FlowShape<T, T>,
    delay: Duration,
    capacity: usize,
    timer: DefaultTimer,
    /// Waiting elements with the instant they become due.
    queue: VecDeque<(Instant, T)>,
    upstream_done: bool,
}

impl<T: Send + 'static> DelayLogic<T> {
    /// Push the head if it is due and wanted, then arrange for what comes next.
    fn advance(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        let now = self.timer.now();
        let head_due = self.queue.front().is_some_and(|(due, _)| *due <= now);
        if head_due && ctx.is_available(self.shape.outlet) {
            if let Some((_, element)) = self.queue.pop_front() {
                ctx.push(self.shape.outlet, element)?;
            }
        }

        if self.upstream_done && self.queue.is_empty() {
            return ctx.complete_stage();
        }
        if let Some((due, _)) = self.queue.front() {
            if *due > now {
                ctx.schedule_once(DUE_TIMER, *due - now);
            }
        }
        if !self.upstream_done
            && self.queue.len() < self.capacity
            && !ctx.has_been_pulled(self.shape.inlet)
        {
            ctx.try_pull(self.shape.inlet)?;
        }
        Ok(())
    }
}

impl<T: Send + 'static> StageLogic for DelayLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        let due = self.timer.now() + self.delay;
        self.queue.push_back((due, element));
        self.advance(ctx)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        self.advance(ctx)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        self.upstream_done = true;
        self.advance(ctx)
    }

    fn on_timer(&mut self, ctx: &mut StageContext<'_>, _key: TimerKey) -> Result<()> {
        self.advance(ctx)
    }
}

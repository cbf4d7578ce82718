// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Rate limiting with a token bucket.
//!
//! The bucket holds `max(maximum_burst, 1)` tokens and starts full, so the
//! first element never waits. One token is added every `per / elements`.
//! Each element costs as many tokens as its cost function says (one for
//! [`throttle`](crate::TimeOps::throttle)).

use crate::logging::trace;
use crate::token_bucket::TokenBucket;
use sluice_core::{Attributes, NotUsed, Result, StreamError};
use sluice_runtime::timer::Timer;
use sluice_runtime::DefaultTimer;
use sluice_stream::{FlowShape, GraphStage, StageContext, StageLogic, TimerKey};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

const RELEASE_TIMER: TimerKey = 0;

type Instant = <DefaultTimer as Timer>::Instant;

/// What a throttle does with an element that arrives too early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThrottleMode {
    /// Hold the element back until the rate allows it, backpressuring upstream.
    #[default]
    Shaping,
    /// Fail with [`StreamError::RateExceeded`]. The failure is supervised, so
    /// a resuming decider drops the element instead.
    Enforcing,
}

/// Throttle stage; build it through [`TimeOps`](crate::TimeOps).
pub struct Throttle<T, C> {
    interval: Duration,
    capacity: u64,
    mode: ThrottleMode,
    cost: Arc<C>,
    _marker: PhantomData<fn(T)>,
}

impl<T, C> Throttle<T, C>
where
    C: Fn(&T) -> u64 + Send + Sync + 'static,
{
    /// `cost_units` tokens per `per`, with up to `maximum_burst` tokens saved.
    pub fn new(cost_units: u32, per: Duration, maximum_burst: u32, cost: C, mode: ThrottleMode) -> Self {
        Self {
            interval: per / cost_units.max(1),
            capacity: u64::from(maximum_burst.max(1)),
            mode,
            cost: Arc::new(cost),
            _marker: PhantomData,
        }
    }
}

impl<T, C> GraphStage for Throttle<T, C>
where
    T: Send + 'static,
    C: Fn(&T) -> u64 + Send + Sync + 'static,
{
    type Shape = FlowShape<T, T>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        FlowShape::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("throttle")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let timer = DefaultTimer::default();
        let logic = ThrottleLogic {
            shape: self.shape(),
            bucket: TokenBucket::new(self.capacity, self.interval, timer.now()),
            timer,
            interval: self.interval,
            capacity: self.capacity,
            mode: self.mode,
            cost: Arc::clone(&self.cost),
            held: None,
            upstream_done: false,
        };
        Ok((Box::new(logic), NotUsed))
    }
}

struct ThrottleLogic<T, C> {
    shape: FlowShape<T, T>,
    bucket: TokenBucket<Instant>,
    timer: DefaultTimer,
    interval: Duration,
    capacity: u64,
    mode: ThrottleMode,
    cost: Arc<C>,
    /// Element waiting for its release timer.
    held: Option<T>,
    upstream_done: bool,
}

impl<T, C> StageLogic for ThrottleLogic<T, C>
where
    T: Send + 'static,
    C: Fn(&T) -> u64 + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        let cost = (self.cost)(&element);
        let now = self.timer.now();
        match self.mode {
            ThrottleMode::Enforcing => {
                if !self.bucket.try_take(now, cost) {
                    return Err(StreamError::rate_exceeded(format!(
                        "one token per {:?} with a burst of {}",
                        self.interval, self.capacity
                    )));
                }
                ctx.push(self.shape.outlet, element)
            }
            ThrottleMode::Shaping => {
                let delay = self.bucket.offer(now, cost);
                if delay.is_zero() {
                    return ctx.push(self.shape.outlet, element);
                }
                trace!("{}: holding element for {:?}", ctx.stage_name(), delay);
                self.held = Some(element);
                ctx.schedule_once(RELEASE_TIMER, delay);
                Ok(())
            }
        }
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        if self.held.is_none() {
            ctx.try_pull(self.shape.inlet)?;
        }
        Ok(())
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        if self.held.is_some() {
            self.upstream_done = true;
            return Ok(());
        }
        ctx.complete_stage()
    }

    fn on_timer(&mut self, ctx: &mut StageContext<'_>, _key: TimerKey) -> Result<()> {
        if let Some(element) = self.held.take() {
            ctx.push(self.shape.outlet, element)?;
        }
        if self.upstream_done {
            return ctx.complete_stage();
        }
        Ok(())
    }

    fn restart(&mut self) {
        self.held = None;
        self.bucket = TokenBucket::new(self.capacity, self.interval, self.timer.now());
    }
}

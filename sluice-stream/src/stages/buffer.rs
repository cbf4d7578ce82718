// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use super::flow_stage;
use crate::context::StageContext;
use crate::dsl::Flow;
use crate::logging::trace;
use crate::logic::StageLogic;
use crate::shape::FlowShape;
use sluice_core::{OverflowStrategy, Result, StreamError};
use std::collections::VecDeque;

/// Bounded FIFO between upstream and downstream.
///
/// With [`OverflowStrategy::Backpressure`] upstream is only pulled while there is
/// room; every other strategy keeps pulling and resolves overflow as it happens.
struct BufferLogic<T> {
    shape: FlowShape<T, T>,
    capacity: usize,
    strategy: OverflowStrategy,
    buffer: VecDeque<T>,
}

impl<T: Send + 'static> BufferLogic<T> {
    fn pull_if_room(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        let room = !self.strategy.is_backpressure() || self.buffer.len() < self.capacity;
        if room {
            ctx.try_pull(self.shape.inlet)?;
        }
        Ok(())
    }

    fn enqueue(&mut self, ctx: &mut StageContext<'_>, element: T) -> Result<bool> {
        if self.buffer.len() < self.capacity {
            self.buffer.push_back(element);
            return Ok(true);
        }
        trace!(
            "buffer of {} full, applying {:?}",
            self.capacity,
            self.strategy
        );
        match self.strategy {
            OverflowStrategy::Backpressure => {
                return Err(StreamError::protocol_violation(
                    "buffer received an element it did not request",
                ))
            }
            OverflowStrategy::DropHead => {
                self.buffer.pop_front();
                self.buffer.push_back(element);
            }
            OverflowStrategy::DropTail => {
                self.buffer.pop_back();
                self.buffer.push_back(element);
            }
            OverflowStrategy::DropBuffer => {
                self.buffer.clear();
                self.buffer.push_back(element);
            }
            OverflowStrategy::DropNew => {}
            OverflowStrategy::Fail => {
                ctx.fail_stage(StreamError::buffer_overflow(self.capacity))?;
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<T: Send + 'static> StageLogic for BufferLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        if !self.enqueue(ctx, element)? {
            return Ok(());
        }
        if ctx.is_available(self.shape.outlet) {
            if let Some(next) = self.buffer.pop_front() {
                ctx.push(self.shape.outlet, next)?;
            }
        }
        self.pull_if_room(ctx)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        if let Some(next) = self.buffer.pop_front() {
            ctx.push(self.shape.outlet, next)?;
        }
        if ctx.is_closed(self.shape.inlet) {
            if self.buffer.is_empty() {
                ctx.complete_stage()?;
            }
            return Ok(());
        }
        self.pull_if_room(ctx)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        if self.buffer.is_empty() {
            ctx.complete_stage()?;
        }
        Ok(())
    }

    fn restart(&mut self) {
        self.buffer.clear();
    }
}

pub(crate) fn buffer<T: Send + 'static>(capacity: usize, strategy: OverflowStrategy) -> Flow<T, T> {
    let capacity = capacity.max(1);
    flow_stage("buffer", move || BufferLogic {
        shape: FlowShape::<T, T>::new(),
        capacity,
        strategy,
        buffer: VecDeque::with_capacity(capacity),
    })
}

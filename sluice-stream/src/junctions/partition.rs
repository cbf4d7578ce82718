// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::context::StageContext;
use crate::logic::StageLogic;
use crate::shape::UniformFanOutShape;
use crate::stage::GraphStage;
use sluice_core::{Attributes, NotUsed, Result, StreamError};
use std::marker::PhantomData;
use std::sync::Arc;

/// Route every element to the outlet `partitioner` selects.
///
/// An element waits until its outlet signals demand; elements for a cancelled
/// outlet are dropped. An index outside `0..n` is a stage failure, subject to
/// supervision.
pub struct Partition<T, F> {
    outputs: usize,
    partitioner: Arc<F>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> Partition<T, F>
where
    F: Fn(&T) -> usize + Send + Sync + 'static,
{
    /// Partition over `outputs` outlets.
    pub fn new(outputs: usize, partitioner: F) -> Self {
        Self {
            outputs,
            partitioner: Arc::new(partitioner),
            _marker: PhantomData,
        }
    }
}

impl<T, F> GraphStage for Partition<T, F>
where
    T: Send + 'static,
    F: Fn(&T) -> usize + Send + Sync + 'static,
{
    type Shape = UniformFanOutShape<T, T>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        UniformFanOutShape::new(self.outputs)
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("partition")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = PartitionLogic {
            shape: self.shape(),
            partitioner: Arc::clone(&self.partitioner),
            pending: None,
            upstream_done: false,
        };
        Ok((Box::new(logic), NotUsed))
    }
}

struct PartitionLogic<T, F> {
    shape: UniformFanOutShape<T, T>,
    partitioner: Arc<F>,
    /// Element waiting for demand on its outlet.
    pending: Option<(usize, T)>,
    upstream_done: bool,
}

impl<T, F> PartitionLogic<T, F>
where
    T: Send + 'static,
    F: Fn(&T) -> usize + Send + Sync + 'static,
{
    fn pull_if_wanted(&self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.pending.is_none()
            && self
                .shape
                .outlets
                .iter()
                .any(|&outlet| ctx.is_available(outlet))
        {
            ctx.try_pull(self.shape.inlet)?;
        }
        Ok(())
    }

    fn settle(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.upstream_done && self.pending.is_none() {
            return ctx.complete_stage();
        }
        self.pull_if_wanted(ctx)
    }
}

impl<T, F> StageLogic for PartitionLogic<T, F>
where
    T: Send + 'static,
    F: Fn(&T) -> usize + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        let index = (self.partitioner)(&element);
        let Some(&outlet) = self.shape.outlets.get(index) else {
            return Err(StreamError::stream_error(format!(
                "partitioner returned {index} for {} outlets",
                self.shape.outlets.len()
            )));
        };
        if ctx.is_available(outlet) {
            ctx.push(outlet, element)?;
        } else if !ctx.is_closed(outlet) {
            self.pending = Some((index, element));
        }
        self.pull_if_wanted(ctx)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, outlet: usize) -> Result<()> {
        if let Some((index, element)) = self.pending.take() {
            if index != outlet {
                self.pending = Some((index, element));
                return Ok(());
            }
            ctx.push(self.shape.outlets[index], element)?;
        }
        self.settle(ctx)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        self.upstream_done = true;
        self.settle(ctx)
    }

    fn on_downstream_finish(&mut self, ctx: &mut StageContext<'_>, outlet: usize) -> Result<()> {
        let all_cancelled = self
            .shape
            .outlets
            .iter()
            .all(|&outlet| ctx.is_closed(outlet));
        if all_cancelled {
            return ctx.complete_stage();
        }
        if self
            .pending
            .as_ref()
            .is_some_and(|(index, _)| *index == outlet)
        {
            self.pending = None;
        }
        self.settle(ctx)
    }
}

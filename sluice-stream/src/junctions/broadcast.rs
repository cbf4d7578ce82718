// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::context::StageContext;
use crate::logic::StageLogic;
use crate::shape::UniformFanOutShape;
use crate::stage::GraphStage;
use sluice_core::{Attributes, NotUsed, Result};
use std::marker::PhantomData;

/// Emit every element to all `n` outlets.
///
/// Upstream is pulled only once every outlet that has not cancelled signals
/// demand, so the slowest consumer sets the pace. A cancelled outlet stops
/// receiving elements; upstream is cancelled once all outlets have cancelled,
/// or at the first cancellation with [`eager_cancel`](Self::eager_cancel).
pub struct Broadcast<T> {
    outputs: usize,
    eager_cancel: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Broadcast<T> {
    /// Broadcast to `outputs` outlets.
    #[must_use]
    pub const fn new(outputs: usize) -> Self {
        Self {
            outputs,
            eager_cancel: false,
            _marker: PhantomData,
        }
    }

    /// Broadcast that completes as soon as any outlet cancels.
    #[must_use]
    pub const fn eager_cancel(outputs: usize) -> Self {
        Self {
            outputs,
            eager_cancel: true,
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + Send + 'static> GraphStage for Broadcast<T> {
    type Shape = UniformFanOutShape<T, T>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        UniformFanOutShape::new(self.outputs)
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("broadcast")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = BroadcastLogic {
            shape: self.shape(),
            eager_cancel: self.eager_cancel,
        };
        Ok((Box::new(logic), NotUsed))
    }
}

struct BroadcastLogic<T> {
    shape: UniformFanOutShape<T, T>,
    eager_cancel: bool,
}

impl<T: Clone + Send + 'static> BroadcastLogic<T> {
    fn pull_if_ready(&self, ctx: &mut StageContext<'_>) -> Result<()> {
        let all_ready = self
            .shape
            .outlets
            .iter()
            .all(|&outlet| ctx.is_closed(outlet) || ctx.is_available(outlet));
        if all_ready {
            ctx.try_pull(self.shape.inlet)?;
        }
        Ok(())
    }
}

impl<T: Clone + Send + 'static> StageLogic for BroadcastLogic<T> {
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let mut element = Some(ctx.grab(self.shape.inlet)?);
        let open: Vec<_> = self
            .shape
            .outlets
            .iter()
            .copied()
            .filter(|&outlet| !ctx.is_closed(outlet))
            .collect();
        let last = open.len().saturating_sub(1);
        for (position, outlet) in open.into_iter().enumerate() {
            let copy = if position == last {
                element.take()
            } else {
                element.clone()
            };
            if let Some(copy) = copy {
                ctx.push(outlet, copy)?;
            }
        }
        Ok(())
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        self.pull_if_ready(ctx)
    }

    fn on_downstream_finish(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        let all_cancelled = self
            .shape
            .outlets
            .iter()
            .all(|&outlet| ctx.is_closed(outlet));
        if self.eager_cancel || all_cancelled {
            return ctx.complete_stage();
        }
        self.pull_if_ready(ctx)
    }
}
